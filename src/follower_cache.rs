//! On-demand bigram follower blocks and the cache that keeps them.
//!
//! The dump is mapped once; a [`FollowerBlock`] is a validated view of one
//! word's records inside that mapping. Nothing is copied out of the arena,
//! records are decoded in place during the binary search.

use crate::dump_reader::endian::Endian;
use crate::error::{Error, Result};
use crate::WordId;
use ahash::AHashMap;
use memmap2::Mmap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Byte offset of the word id inside a raw bigram record.
const WORD_ID_OFFSET: usize = 0;
/// Byte offset of the probability index inside a raw bigram record.
const PROBABILITY_INDEX_OFFSET: usize = 2;
/// A record must at least hold the word id and the probability index.
const MIN_RECORD_BYTES: u64 = PROBABILITY_INDEX_OFFSET as u64 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerEntry {
    pub second_word_id: WordId,
    /// Index into the bigram probability table.
    pub probability_index: u16,
}

/// Where one word's follower records live inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerRegion {
    /// Absolute byte offset of the first record.
    pub start: u64,
    /// Number of followers, not counting the trailing sentinel record.
    pub count: u32,
    pub record_bytes: u64,
}

impl FollowerRegion {
    /// Bytes covered by the followers plus the sentinel record.
    pub fn byte_len(&self) -> u64 {
        (self.count as u64 + 1) * self.record_bytes
    }
}

/// Sorted follower records of one first word.
#[derive(Debug)]
pub struct FollowerBlock {
    arena: Arc<Mmap>,
    start: usize,
    count: usize,
    record_bytes: usize,
    order: Endian,
}

impl FollowerBlock {
    /// Validates `region` inside `arena` and returns a view of it.
    ///
    /// # Errors
    /// * [`Error::CorruptTable`] if records are narrower than a word id plus a
    ///   probability index
    /// * [`Error::Io`] (`UnexpectedEof`) if the region runs past the end of the file
    /// * [`Error::CorruptTable`] if word ids are not strictly ascending or a
    ///   probability index is outside the bigram table
    pub fn load(
        arena: Arc<Mmap>,
        region: FollowerRegion,
        order: Endian,
        probability_table_len: usize,
    ) -> Result<Self> {
        if region.record_bytes < MIN_RECORD_BYTES {
            return Err(Error::CorruptTable(format!(
                "bigram record width {} is below {} bytes",
                region.record_bytes, MIN_RECORD_BYTES
            )));
        }
        let end = region.start.checked_add(region.byte_len());
        if end.map_or(true, |end| end > arena.len() as u64) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "bigram followers at {}..{} exceed file size {}",
                    region.start,
                    region.start.saturating_add(region.byte_len()),
                    arena.len()
                ),
            )));
        }

        let block = Self {
            arena,
            start: region.start as usize,
            count: region.count as usize,
            record_bytes: region.record_bytes as usize,
            order,
        };

        let mut previous: Option<WordId> = None;
        for entry in block.iter() {
            if previous.map_or(false, |p| p >= entry.second_word_id) {
                return Err(Error::CorruptTable(format!(
                    "bigram followers at offset {} are not sorted by word id",
                    region.start
                )));
            }
            if entry.probability_index as usize >= probability_table_len {
                return Err(Error::CorruptTable(format!(
                    "bigram probability index {} outside table of {}",
                    entry.probability_index, probability_table_len
                )));
            }
            previous = Some(entry.second_word_id);
        }
        Ok(block)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn entry(&self, index: usize) -> Option<FollowerEntry> {
        if index >= self.count {
            return None;
        }
        let at = self.start + index * self.record_bytes;
        let record = &self.arena[at..at + self.record_bytes];
        Some(FollowerEntry {
            second_word_id: self.order.u16_at(&record[WORD_ID_OFFSET..]) as WordId,
            probability_index: self.order.u16_at(&record[PROBABILITY_INDEX_OFFSET..]),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = FollowerEntry> + '_ {
        (0..self.count).filter_map(move |index| self.entry(index))
    }

    /// Binary search for the record of `second_word_id`.
    pub fn find(&self, second_word_id: WordId) -> Option<FollowerEntry> {
        let (mut low, mut high) = (0, self.count);
        while low < high {
            let mid = low + (high - low) / 2;
            let entry = self.entry(mid)?;
            match entry.second_word_id.cmp(&second_word_id) {
                std::cmp::Ordering::Equal => return Some(entry),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        None
    }
}

type Slot = Arc<OnceCell<Arc<FollowerBlock>>>;

/// Unbounded, never-evicting cache of follower blocks keyed by first word.
///
/// The map lock is only held long enough to find or create a key's slot;
/// the slot itself serialises loading, so each key is loaded at most once
/// while different keys load in parallel.
#[derive(Debug, Default)]
pub struct FollowerCache {
    slots: RwLock<AHashMap<WordId, Slot>>,
    loads: AtomicUsize,
}

impl FollowerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached block for `first_word_id`, running `load` if there is none yet.
    ///
    /// A failed load is returned to the caller and leaves the key uncached.
    pub fn get_or_load<F>(&self, first_word_id: WordId, load: F) -> Result<Arc<FollowerBlock>>
    where
        F: FnOnce() -> Result<FollowerBlock>,
    {
        let slot = self.slot(first_word_id);
        let block = slot.get_or_try_init(|| {
            self.loads.fetch_add(1, Ordering::Relaxed);
            load().map(Arc::new)
        })?;
        Ok(Arc::clone(block))
    }

    pub fn get(&self, first_word_id: WordId) -> Option<Arc<FollowerBlock>> {
        self.slots
            .read()
            .get(&first_word_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of load attempts made so far, failed ones included.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn slot(&self, first_word_id: WordId) -> Slot {
        if let Some(slot) = self.slots.read().get(&first_word_id) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(first_word_id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memmap2::MmapMut;
    use std::thread;
    use std::time::Duration;

    /// Anonymous mapping holding `prefix` junk bytes followed by big-endian
    /// 8-byte records and a sentinel.
    fn arena(prefix: usize, records: &[(u16, u16)]) -> Arc<Mmap> {
        let mut bytes = vec![0xAAu8; prefix];
        for &(word, prob) in records.iter().chain(std::iter::once(&(0xFFFF, 0))) {
            bytes.extend_from_slice(&word.to_be_bytes());
            bytes.extend_from_slice(&prob.to_be_bytes());
            bytes.extend_from_slice(&[0, 0, 0, 0]);
        }
        let mut map = MmapMut::map_anon(bytes.len()).unwrap();
        map.copy_from_slice(&bytes);
        Arc::new(map.make_read_only().unwrap())
    }

    fn region(start: u64, count: u32) -> FollowerRegion {
        FollowerRegion {
            start,
            count,
            record_bytes: 8,
        }
    }

    #[test]
    fn finds_followers_by_binary_search() {
        let records = [(1, 0), (4, 2), (9, 1), (12, 3)];
        let block = FollowerBlock::load(arena(5, &records), region(5, 4), Endian::Big, 4).unwrap();

        assert_eq!(block.len(), 4);
        for &(word, prob) in &records {
            let found = block.find(word as WordId).unwrap();
            assert_eq!(found.probability_index, prob);
        }
        for missing in [0, 2, 5, 10, 13, 0xFFFF] {
            assert!(block.find(missing).is_none());
        }
        assert_eq!(block.iter().count(), 4);
        assert!(block.entry(4).is_none());
    }

    #[test]
    fn empty_block_finds_nothing() {
        let block = FollowerBlock::load(arena(0, &[]), region(0, 0), Endian::Big, 1).unwrap();
        assert!(block.is_empty());
        assert!(block.find(0).is_none());
    }

    #[test]
    fn region_past_end_of_file_is_io_error() {
        let result = FollowerBlock::load(arena(0, &[(1, 0)]), region(8, 4), Endian::Big, 1);
        assert!(matches!(result, Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn records_too_narrow_for_an_index_are_corrupt() {
        for record_bytes in [0, 1, 3] {
            let narrow = FollowerRegion {
                start: 0,
                count: 1,
                record_bytes,
            };
            let result = FollowerBlock::load(arena(0, &[(1, 0)]), narrow, Endian::Big, 1);
            assert!(matches!(result, Err(Error::CorruptTable(_))), "{} bytes", record_bytes);
        }
    }

    #[test]
    fn unsorted_records_are_corrupt() {
        let result =
            FollowerBlock::load(arena(0, &[(5, 0), (3, 0)]), region(0, 2), Endian::Big, 1);
        assert!(matches!(result, Err(Error::CorruptTable(_))));
    }

    #[test]
    fn probability_index_must_fit_table() {
        let result = FollowerBlock::load(arena(0, &[(5, 7)]), region(0, 1), Endian::Big, 7);
        assert!(matches!(result, Err(Error::CorruptTable(_))));
    }

    #[test]
    fn loads_each_key_once() {
        let map = arena(0, &[(3, 0)]);
        let cache = FollowerCache::new();
        let load = || FollowerBlock::load(Arc::clone(&map), region(0, 1), Endian::Big, 1);

        let first = cache.get_or_load(7, load).unwrap();
        let second = cache.get_or_load(7, load).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loads(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(7).is_some());
        assert!(cache.get(8).is_none());
    }

    #[test]
    fn failed_load_is_not_cached() {
        let map = arena(0, &[(3, 0)]);
        let cache = FollowerCache::new();

        let err = cache.get_or_load(1, || FollowerBlock::load(Arc::clone(&map), region(64, 1), Endian::Big, 1));
        assert!(err.is_err());
        assert!(cache.is_empty());

        cache
            .get_or_load(1, || FollowerBlock::load(Arc::clone(&map), region(0, 1), Endian::Big, 1))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let map = arena(0, &[(3, 0), (6, 0)]);
        let cache = FollowerCache::new();
        let performed = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let block = cache
                        .get_or_load(42, || {
                            performed.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            FollowerBlock::load(Arc::clone(&map), region(0, 2), Endian::Big, 1)
                        })
                        .unwrap();
                    assert_eq!(block.len(), 2);
                });
            }
        });

        assert_eq!(performed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loads(), 1);
    }
}
