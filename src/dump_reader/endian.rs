//! Byte order of a dump, fixed once by the header handshake.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian, ReadBytesExt};
use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Byte order of the machine running the loader.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn swapped(self) -> Self {
        match self {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        }
    }

    /// Determines the byte order from four raw bytes that must decode to `expected`.
    ///
    /// Native order is tried first, then the swapped one. Returns `None` when
    /// neither order produces `expected`.
    pub fn detect(raw: [u8; 4], expected: u32) -> Option<Self> {
        let native = NativeEndian::read_u32(&raw);
        if native == expected {
            Some(Self::native())
        } else if native.swap_bytes() == expected {
            Some(Self::native().swapped())
        } else {
            None
        }
    }

    pub fn read_i32<R: Read>(self, reader: &mut R) -> io::Result<i32> {
        match self {
            Endian::Big => reader.read_i32::<BigEndian>(),
            Endian::Little => reader.read_i32::<LittleEndian>(),
        }
    }

    pub fn read_f32<R: Read>(self, reader: &mut R) -> io::Result<f32> {
        match self {
            Endian::Big => reader.read_f32::<BigEndian>(),
            Endian::Little => reader.read_f32::<LittleEndian>(),
        }
    }

    /// Decodes a `u16` from the first two bytes of `bytes`.
    ///
    /// Callers slice records out of a bounds-checked region, so `bytes` always
    /// holds at least two bytes.
    #[inline]
    pub fn u16_at(self, bytes: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(bytes),
            Endian::Little => LittleEndian::read_u16(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_both_orders() {
        assert_eq!(Endian::detect(17u32.to_be_bytes(), 17), Some(Endian::Big));
        assert_eq!(Endian::detect(17u32.to_le_bytes(), 17), Some(Endian::Little));
        assert_eq!(Endian::detect(*b"DARP", 17), None);
    }

    #[test]
    fn native_detection_comes_first() {
        assert_eq!(Endian::detect(17u32.to_ne_bytes(), 17), Some(Endian::native()));
        assert_eq!(Endian::native().swapped().swapped(), Endian::native());
    }

    #[test]
    fn reads_in_selected_order() {
        let mut big = Cursor::new(vec![0, 0, 1, 2, 0x3f, 0x80, 0, 0]);
        assert_eq!(Endian::Big.read_i32(&mut big).unwrap(), 258);
        assert_eq!(Endian::Big.read_f32(&mut big).unwrap(), 1.0);

        let mut little = Cursor::new(vec![2, 1, 0, 0, 0, 0, 0x80, 0x3f]);
        assert_eq!(Endian::Little.read_i32(&mut little).unwrap(), 258);
        assert_eq!(Endian::Little.read_f32(&mut little).unwrap(), 1.0);

        assert_eq!(Endian::Big.u16_at(&[1, 2]), 0x0102);
        assert_eq!(Endian::Little.u16_at(&[1, 2]), 0x0201);
    }
}
