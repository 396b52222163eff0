//! The fully resident unigram table.

use crate::error::{Error, Result};
use crate::log_math::LogMath;
use crate::WordId;

/// One unigram, probabilities already in the working log base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnigramEntry {
    pub log_probability: f32,
    pub log_backoff: f32,
    /// Index of this word's first record in the raw bigram region.
    pub first_bigram_offset: u32,
}

/// Unigram entries indexed by word id, plus one sentinel entry past the last
/// word so that follower counts are a difference of neighbouring offsets.
#[derive(Debug, Clone)]
pub struct UnigramTable {
    entries: Vec<UnigramEntry>,
}

impl UnigramTable {
    /// Builds the table from the `N` entries of a dump and appends the sentinel.
    ///
    /// # Errors
    /// * [`Error::CorruptTable`] if bigram offsets decrease or point past the
    ///   bigram region
    pub fn with_sentinel(mut entries: Vec<UnigramEntry>, number_bigrams: u32) -> Result<Self> {
        let mut previous = 0u32;
        for (id, entry) in entries.iter().enumerate() {
            if entry.first_bigram_offset < previous {
                return Err(Error::CorruptTable(format!(
                    "unigram {} first bigram entry {} is below its predecessor's {}",
                    id, entry.first_bigram_offset, previous
                )));
            }
            if entry.first_bigram_offset > number_bigrams {
                return Err(Error::CorruptTable(format!(
                    "unigram {} first bigram entry {} exceeds bigram count {}",
                    id, entry.first_bigram_offset, number_bigrams
                )));
            }
            previous = entry.first_bigram_offset;
        }
        entries.push(UnigramEntry {
            log_probability: LogMath::LOG_ZERO,
            log_backoff: 0.0,
            first_bigram_offset: number_bigrams,
        });
        Ok(Self { entries })
    }

    /// Number of real words (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: WordId) -> Option<&UnigramEntry> {
        self.entries[..self.len()].get(id as usize)
    }

    /// Number of bigram followers recorded for `id`; zero for unknown ids.
    pub fn follower_count(&self, id: WordId) -> u32 {
        let id = id as usize;
        if id >= self.len() {
            return 0;
        }
        self.entries[id + 1].first_bigram_offset - self.entries[id].first_bigram_offset
    }

    /// Interpolates every unigram except sentence start with a uniform floor:
    /// `p' = logAdd(p + log(w), log(1 / (N - 1)) + log(1 - w))`.
    pub fn apply_unigram_weight(
        &mut self,
        log_math: &LogMath,
        unigram_weight: f32,
        sentence_start: Option<WordId>,
    ) {
        let words = self.len();
        let log_weight = log_math.linear_to_log(unigram_weight as f64);
        let log_not_weight = log_math.linear_to_log(1.0 - unigram_weight as f64);
        let log_uniform = if words > 1 {
            log_math.linear_to_log(1.0 / (words - 1) as f64)
        } else {
            LogMath::LOG_ZERO
        };
        let uniform_share = log_uniform + log_not_weight;

        for (id, entry) in self.entries[..words].iter_mut().enumerate() {
            if Some(id as WordId) == sentence_start {
                continue;
            }
            let weighted = entry.log_probability + log_weight;
            entry.log_probability = log_math.add_as_linear(weighted, uniform_share);
        }
    }
}
