//! Sequential parser for CMU-Cambridge binary trigram LM dumps.
//!
//! ## Layout
//!
//! ```text
//! header_len: i32 = 17 (native or swapped, fixes the byte order)
//! header:     "Darpa Trigram LM" + NUL
//! name_len:   i32, followed by name_len bytes of source file name
//! version:    i32
//!   version <= 0:  timestamp: i32
//!                  { len: i32, bytes[len] }* terminated by len == 0
//!                  log2_bigram_segment_size: i32   (version <= -2 only)
//!                  unigram_count: i32
//!   version > 0:   version is the unigram count
//! bigram_count:  i32
//! trigram_count: i32
//! unigrams:      unigram_count x (id: i32, prob: f32, backoff: f32, first_bigram: i32)
//! bigrams:       (bigram_count + 1) raw records      (only if bigram_count > 0)
//! trigrams:      trigram_count raw records           (only if trigram_count > 0)
//! bigram probs:  len: i32, f32[len]                  (only if bigram_count > 0)
//! trigram tables (only if trigram_count > 0):
//!                backoff: len: i32, f32[len]
//!                probs:   len: i32, f32[len]
//!                segments: len: i32, i32[len]
//! words:         len: i32, NUL-terminated words
//! ```
//!
//! Probabilities are log10 on disk and converted to the working log base as
//! they are read. The raw bigram and trigram regions are seeked over without
//! being read; only their offsets are recorded for later memory-mapped access.

pub mod endian;

use crate::error::{Error, Result};
use crate::log_math::LogMath;
use crate::unigram::UnigramEntry;
use endian::Endian;
use std::io::{self, Read, Seek, SeekFrom};

/// Magic header string every dump starts with.
pub const DARPA_LM_HEADER: &str = "Darpa Trigram LM";

/// Segment size exponent used when the header does not carry one.
pub const LOG2_BIGRAM_SEGMENT_SIZE_DEFAULT: u32 = 9;

/// Largest quantized probability table a 16-bit index can address.
pub const MAX_PROBABILITY_TABLE_LEN: i32 = 65536;

/// Oldest versioned header this reader understands; later ones use 32-bit word ids.
const MIN_SUPPORTED_VERSION: i32 = -2;

/// Byte widths of the raw records in the bigram and trigram regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub bigram_bytes: u64,
    pub trigram_bytes: u64,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            bigram_bytes: crate::config::DEFAULT_BIGRAM_RECORD_BYTES,
            trigram_bytes: crate::config::DEFAULT_TRIGRAM_RECORD_BYTES,
        }
    }
}

/// Header fields and table geometry of a dump.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpHeader {
    pub byte_order: Endian,
    /// Raw version field; positive values are the unigram count of an unversioned dump.
    pub version: i32,
    pub timestamp: Option<i32>,
    /// Name of the ARPA file the dump was built from.
    pub source_name: String,
    pub log2_bigram_segment_size: u32,
    pub number_unigrams: u32,
    pub number_bigrams: u32,
    pub number_trigrams: u32,
}

impl DumpHeader {
    pub fn bigram_segment_size(&self) -> u32 {
        1 << self.log2_bigram_segment_size
    }
}

/// Trigram tables, parsed and kept but not consulted by any query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrigramTables {
    /// File offset of the raw trigram region.
    pub region_offset: u64,
    pub backoff: Vec<f32>,
    pub probabilities: Vec<f32>,
    /// First trigram index of each bigram segment.
    pub segments: Vec<i32>,
}

/// Everything the sequential pass extracts from a dump.
#[derive(Debug)]
pub struct ModelDump {
    pub header: DumpHeader,
    pub unigrams: Vec<UnigramEntry>,
    /// File offset of the raw bigram region.
    pub bigram_offset: u64,
    pub bigram_probabilities: Vec<f32>,
    pub trigram: Option<TrigramTables>,
    pub words: Vec<String>,
}

/// Reader that tracks its offset from where the dump starts.
///
/// Raw n-gram regions are skipped with a seek, so their bytes are never
/// pulled through the reader at load time.
struct CountingReader<R> {
    inner: R,
    position: u64,
    /// Bytes between the start of the dump and the end of the stream.
    len: u64,
}

impl<R: Read + Seek> CountingReader<R> {
    fn new(mut inner: R) -> io::Result<Self> {
        let start = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            position: 0,
            len: end.saturating_sub(start),
        })
    }

    fn skip(&mut self, count: u64) -> io::Result<()> {
        let target = self.position.checked_add(count);
        let offset = match (target, i64::try_from(count)) {
            (Some(target), Ok(offset)) if target <= self.len => offset,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "dump truncated: cannot skip {} bytes at offset {} of {}",
                        count, self.position, self.len
                    ),
                ))
            }
        };
        self.inner.seek(SeekFrom::Current(offset))?;
        self.position += count;
        Ok(())
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

/// Parses a whole dump from `reader`.
///
/// # Arguments
/// * `reader` - Seekable byte stream positioned at the start of the dump
/// * `log_math` - Log domain the probabilities are converted into
/// * `layout` - Raw record widths used to skip the bigram and trigram regions
///
/// # Errors
/// * [`Error::MalformedHeader`] if the magic length or string does not match
/// * [`Error::UnsupportedVersion`] for 32-bit word-id dumps
/// * [`Error::CorruptTable`] for out-of-range counts, table sizes or word lists
/// * [`Error::Io`] if the stream ends early
pub fn read_dump<R: Read + Seek>(reader: R, log_math: &LogMath, layout: RecordLayout) -> Result<ModelDump> {
    let mut reader = DumpReader::new(reader, *log_math)?;
    reader.read_magic_string()?;
    let header = reader.read_header()?;
    tracing::debug!(
        byte_order = ?header.byte_order,
        version = header.version,
        unigrams = header.number_unigrams,
        bigrams = header.number_bigrams,
        trigrams = header.number_trigrams,
        "dump header parsed"
    );

    let unigrams = reader.read_unigrams(header.number_unigrams)?;

    let bigram_offset = reader.position();
    if header.number_bigrams > 0 {
        reader.skip_records(header.number_bigrams as u64 + 1, layout.bigram_bytes)?;
    }
    let trigram_offset = reader.position();
    if header.number_trigrams > 0 {
        reader.skip_records(header.number_trigrams as u64, layout.trigram_bytes)?;
    }
    tracing::debug!(bigram_offset, trigram_offset, "raw n-gram regions located");

    let bigram_probabilities = if header.number_bigrams > 0 {
        reader.read_probability_table("bigram probability")?
    } else {
        Vec::new()
    };

    let trigram = if header.number_trigrams > 0 {
        let backoff = reader.read_probability_table("trigram backoff")?;
        let probabilities = reader.read_probability_table("trigram probability")?;
        let expected = (header.number_bigrams + 1) / header.bigram_segment_size() + 1;
        let segments = reader.read_segment_table(expected)?;
        Some(TrigramTables {
            region_offset: trigram_offset,
            backoff,
            probabilities,
            segments,
        })
    } else {
        None
    };

    let words = reader.read_words(header.number_unigrams)?;

    Ok(ModelDump {
        header,
        unigrams,
        bigram_offset,
        bigram_probabilities,
        trigram,
        words,
    })
}

struct DumpReader<R> {
    inner: CountingReader<R>,
    order: Endian,
    log_math: LogMath,
}

impl<R: Read + Seek> DumpReader<R> {
    /// Performs the byte-order handshake on the leading header length.
    fn new(reader: R, log_math: LogMath) -> Result<Self> {
        let mut inner = CountingReader::new(reader)?;
        let mut raw = [0u8; 4];
        inner.read_exact(&mut raw)?;

        let expected = DARPA_LM_HEADER.len() as u32 + 1;
        let order = Endian::detect(raw, expected).ok_or_else(|| {
            Error::MalformedHeader(format!(
                "bad magic number {:?}, not an LM dump file",
                raw
            ))
        })?;

        Ok(Self {
            inner,
            order,
            log_math,
        })
    }

    fn position(&self) -> u64 {
        self.inner.position
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.order.read_i32(&mut self.inner)?)
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(self.order.read_f32(&mut self.inner)?)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn skip_records(&mut self, count: u64, record_bytes: u64) -> Result<()> {
        Ok(self.inner.skip(count * record_bytes)?)
    }

    /// Reads a length field that must be non-negative.
    fn read_len(&mut self, what: &str) -> Result<usize> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::CorruptTable(format!("negative {} length: {}", what, len)));
        }
        Ok(len as usize)
    }

    fn read_magic_string(&mut self) -> Result<()> {
        let bytes = self.read_bytes(DARPA_LM_HEADER.len())?;
        self.read_bytes(1)?;
        let header = latin1(&bytes);
        if header != DARPA_LM_HEADER {
            return Err(Error::MalformedHeader(format!(
                "bad binary LM header: {:?}",
                header
            )));
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<DumpHeader> {
        let name_len = self.read_len("source name")?;
        let source_name = decode_word(self.read_bytes(name_len)?)
            .trim_end_matches('\0')
            .to_string();

        let mut log2_bigram_segment_size = LOG2_BIGRAM_SEGMENT_SIZE_DEFAULT;
        let mut timestamp = None;

        let version = self.read_i32()?;
        let number_unigrams = if version <= 0 {
            if version < MIN_SUPPORTED_VERSION {
                return Err(Error::UnsupportedVersion(version));
            }
            timestamp = Some(self.read_i32()?);

            // free-form format description, terminated by an empty block
            loop {
                let block_len = self.read_len("format description")?;
                if block_len == 0 {
                    break;
                }
                self.inner.skip(block_len as u64)?;
            }

            if version <= -2 {
                let log2 = self.read_i32()?;
                if !(1..=15).contains(&log2) {
                    return Err(Error::CorruptTable(format!(
                        "log2(bigram segment size) {} outside 1..15",
                        log2
                    )));
                }
                log2_bigram_segment_size = log2 as u32;
            }
            self.read_i32()?
        } else {
            version
        };

        if number_unigrams <= 0 {
            return Err(Error::CorruptTable(format!(
                "bad number of unigrams: {}, must be > 0",
                number_unigrams
            )));
        }
        let number_bigrams = self.read_i32()?;
        if number_bigrams < 0 {
            return Err(Error::CorruptTable(format!(
                "bad number of bigrams: {}",
                number_bigrams
            )));
        }
        let number_trigrams = self.read_i32()?;
        if number_trigrams < 0 {
            return Err(Error::CorruptTable(format!(
                "bad number of trigrams: {}",
                number_trigrams
            )));
        }

        Ok(DumpHeader {
            byte_order: self.order,
            version,
            timestamp,
            source_name,
            log2_bigram_segment_size,
            number_unigrams: number_unigrams as u32,
            number_bigrams: number_bigrams as u32,
            number_trigrams: number_trigrams as u32,
        })
    }

    fn read_unigrams(&mut self, count: u32) -> Result<Vec<UnigramEntry>> {
        let mut unigrams = Vec::with_capacity(count as usize + 1);
        for index in 0..count {
            let id = self.read_i32()?;
            if id != index as i32 {
                tracing::warn!(index, id, "unigram id does not match its position");
            }
            let probability = self.read_f32()?;
            let backoff = self.read_f32()?;
            let first_bigram_entry = self.read_i32()?;
            if first_bigram_entry < 0 {
                return Err(Error::CorruptTable(format!(
                    "unigram {} has negative first bigram entry {}",
                    index, first_bigram_entry
                )));
            }

            unigrams.push(UnigramEntry {
                log_probability: self.log_math.log10_to_log(probability),
                log_backoff: self.log_math.log10_to_log(backoff),
                first_bigram_offset: first_bigram_entry as u32,
            });
        }
        Ok(unigrams)
    }

    /// Reads a length-prefixed quantized log10 table, converting it to the working base.
    fn read_probability_table(&mut self, what: &str) -> Result<Vec<f32>> {
        let len = self.read_i32()?;
        if len <= 0 || len > MAX_PROBABILITY_TABLE_LEN {
            return Err(Error::CorruptTable(format!("bad {} table size: {}", what, len)));
        }
        let mut table = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let log10 = self.read_f32()?;
            table.push(self.log_math.log10_to_log(log10));
        }
        Ok(table)
    }

    fn read_segment_table(&mut self, expected: u32) -> Result<Vec<i32>> {
        let len = self.read_i32()?;
        if len != expected as i32 {
            return Err(Error::CorruptTable(format!(
                "bad trigram segment table size: {}, expected {}",
                len, expected
            )));
        }
        let mut segments = Vec::with_capacity(len as usize);
        for _ in 0..len {
            segments.push(self.read_i32()?);
        }
        Ok(segments)
    }

    fn read_words(&mut self, number_unigrams: u32) -> Result<Vec<String>> {
        let len = self.read_i32()?;
        if len <= 0 {
            return Err(Error::CorruptTable(format!("bad word string size: {}", len)));
        }
        let blob = self.read_bytes(len as usize)?;

        let separators = blob.iter().filter(|&&b| b == 0).count();
        if separators != number_unigrams as usize {
            return Err(Error::CorruptTable(format!(
                "bad number of words: {}, expected {}",
                separators, number_unigrams
            )));
        }

        Ok(blob
            .split(|&b| b == 0)
            .take(number_unigrams as usize)
            .map(|word| decode_word(word.to_vec()))
            .collect())
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// UTF-8 when valid, otherwise one char per byte.
fn decode_word(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(word) => word,
        Err(err) => latin1(err.as_bytes()),
    }
}
