//! The query surface: loading a dump and scoring unigrams and bigrams.

use crate::config::LanguageModelConfig;
use crate::dump_reader::{read_dump, DumpHeader, RecordLayout, TrigramTables};
use crate::error::{Error, Result};
use crate::follower_cache::{FollowerBlock, FollowerCache, FollowerRegion};
use crate::log_math::LogMath;
use crate::unigram::{UnigramEntry, UnigramTable};
use crate::vocabulary::Vocabulary;
use crate::WordId;
use ahash::AHashSet;
use memmap2::Mmap;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

/// A binary trigram LM dump with resident unigrams and lazily paged bigrams.
///
/// All probabilities are logarithms in the configured base. Only unigram and
/// bigram sequences can be scored; the trigram tables are loaded but no
/// trigram estimate is produced.
#[derive(Debug)]
pub struct LargeTrigramModel {
    config: LanguageModelConfig,
    log_math: LogMath,
    header: DumpHeader,
    vocabulary: Vocabulary,
    unigrams: UnigramTable,
    bigram_offset: u64,
    bigram_probabilities: Vec<f32>,
    trigram: Option<TrigramTables>,
    arena: Arc<Mmap>,
    followers: FollowerCache,
}

impl LargeTrigramModel {
    /// Highest n-gram order [`score`](Self::score) accepts.
    pub const MAX_ORDER: usize = 2;

    /// Loads the dump named by `config.location`.
    ///
    /// # Design Notes
    /// - The dump is parsed once, front to back, through a buffered reader
    /// - The unigram weight is applied before the model is returned
    /// - The file is then mapped read-only for bigram paging
    ///
    /// # Errors
    /// * Any load-time [`Error`]; no partially loaded model is ever returned
    pub fn load(config: LanguageModelConfig) -> Result<Self> {
        config.validate()?;
        let started = Instant::now();
        let log_math = LogMath::new(config.log_base)?;
        let layout = RecordLayout {
            bigram_bytes: config.bigram_record_bytes,
            trigram_bytes: config.trigram_record_bytes,
        };

        let dump = {
            let file = File::open(&config.location)?;
            read_dump(BufReader::new(file), &log_math, layout)?
        };

        let vocabulary =
            Vocabulary::build(dump.words, &config.sentence_start, &config.sentence_end);
        let mut unigrams = UnigramTable::with_sentinel(dump.unigrams, dump.header.number_bigrams)?;
        unigrams.apply_unigram_weight(&log_math, config.unigram_weight, vocabulary.sentence_start());

        // Map after the sequential pass is finished; the dump is never written while loaded.
        let file = File::open(&config.location)?;
        let arena = Arc::new(unsafe { Mmap::map(&file)? });

        tracing::info!(
            location = %config.location.display(),
            byte_order = ?dump.header.byte_order,
            version = dump.header.version,
            unigrams = dump.header.number_unigrams,
            bigrams = dump.header.number_bigrams,
            trigrams = dump.header.number_trigrams,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "language model loaded"
        );

        Ok(Self {
            config,
            log_math,
            header: dump.header,
            vocabulary,
            unigrams,
            bigram_offset: dump.bigram_offset,
            bigram_probabilities: dump.bigram_probabilities,
            trigram: dump.trigram,
            arena,
            followers: FollowerCache::new(),
        })
    }

    /// Log probability of a word sequence given as surface words.
    ///
    /// The last word is the one being predicted; lookups ignore case.
    ///
    /// # Errors
    /// * [`Error::UnsupportedOrder`] unless the sequence has one or two words
    /// * [`Error::UnknownWord`] if a word is not in the vocabulary
    /// * [`Error::Io`] / [`Error::CorruptTable`] if a follower block cannot be paged in
    pub fn score<S: AsRef<str>>(&self, words: &[S]) -> Result<f32> {
        check_order(words.len())?;
        let ids = words
            .iter()
            .map(|word| self.require_id(word.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.score_ids(&ids)
    }

    /// Log probability of a word sequence given as word ids.
    pub fn score_ids(&self, ids: &[WordId]) -> Result<f32> {
        check_order(ids.len())?;
        match *ids {
            [word] => Ok(self.require_unigram(word)?.log_probability),
            [first, second] => self.bigram_probability(first, second),
            _ => Err(Error::UnsupportedOrder(ids.len())),
        }
    }

    /// Bigram estimate with Katz backoff to the unigram distribution.
    fn bigram_probability(&self, first: WordId, second: WordId) -> Result<f32> {
        let first_entry = self.require_unigram(first)?;
        let second_entry = self.require_unigram(second)?;

        if self.header.number_bigrams == 0 || self.unigrams.follower_count(first) == 0 {
            return Ok(second_entry.log_probability);
        }

        match self.bigram_followers(first)?.find(second) {
            Some(follower) => self
                .bigram_probabilities
                .get(follower.probability_index as usize)
                .copied()
                .ok_or_else(|| {
                    Error::CorruptTable(format!(
                        "bigram probability index {} outside table",
                        follower.probability_index
                    ))
                }),
            None => Ok(first_entry.log_backoff + second_entry.log_probability),
        }
    }

    /// Follower block of `first`, paged in on first use and cached afterwards.
    pub fn bigram_followers(&self, first: WordId) -> Result<Arc<FollowerBlock>> {
        let entry = self.require_unigram(first)?;
        let record_bytes = self.config.bigram_record_bytes;
        let region = FollowerRegion {
            start: self.bigram_offset + entry.first_bigram_offset as u64 * record_bytes,
            count: self.unigrams.follower_count(first),
            record_bytes,
        };

        self.followers.get_or_load(first, || {
            tracing::debug!(
                word_id = first,
                followers = region.count,
                start = region.start,
                bytes = region.byte_len(),
                "paging in bigram followers"
            );
            FollowerBlock::load(
                Arc::clone(&self.arena),
                region,
                self.header.byte_order,
                self.bigram_probabilities.len(),
            )
        })
    }

    /// Backoff weight for a context.
    ///
    /// A single word yields its unigram backoff; every other length yields
    /// log(1) = 0.
    pub fn backoff<S: AsRef<str>>(&self, words: &[S]) -> Result<f32> {
        match words {
            [word] => {
                let id = self.require_id(word.as_ref())?;
                Ok(self.require_unigram(id)?.log_backoff)
            }
            _ => Ok(0.0),
        }
    }

    pub fn max_order(&self) -> usize {
        Self::MAX_ORDER
    }

    /// Surface spellings of every word in the model.
    pub fn vocabulary(&self) -> &AHashSet<String> {
        self.vocabulary.words()
    }

    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.vocabulary.id(word)
    }

    /// Original spelling of `id`.
    pub fn word(&self, id: WordId) -> Option<&str> {
        self.vocabulary.word(id)
    }

    pub fn sentence_start_id(&self) -> Option<WordId> {
        self.vocabulary.sentence_start()
    }

    pub fn sentence_end_id(&self) -> Option<WordId> {
        self.vocabulary.sentence_end()
    }

    /// Smoothed unigram entry of `id`.
    pub fn unigram(&self, id: WordId) -> Option<&UnigramEntry> {
        self.unigrams.get(id)
    }

    pub fn number_of_unigrams(&self) -> u32 {
        self.header.number_unigrams
    }

    pub fn number_of_bigrams(&self) -> u32 {
        self.header.number_bigrams
    }

    pub fn number_of_trigrams(&self) -> u32 {
        self.header.number_trigrams
    }

    /// Dequantized bigram probabilities in the working log base.
    pub fn bigram_probabilities(&self) -> &[f32] {
        &self.bigram_probabilities
    }

    pub fn trigram_tables(&self) -> Option<&TrigramTables> {
        self.trigram.as_ref()
    }

    pub fn header(&self) -> &DumpHeader {
        &self.header
    }

    pub fn log_math(&self) -> &LogMath {
        &self.log_math
    }

    pub fn config(&self) -> &LanguageModelConfig {
        &self.config
    }

    /// Number of follower blocks paged in so far.
    pub fn cached_follower_blocks(&self) -> usize {
        self.followers.len()
    }

    /// Number of follower block loads performed so far.
    pub fn follower_loads(&self) -> usize {
        self.followers.loads()
    }

    fn require_id(&self, word: &str) -> Result<WordId> {
        self.vocabulary
            .id(word)
            .ok_or_else(|| Error::UnknownWord(word.to_string()))
    }

    fn require_unigram(&self, id: WordId) -> Result<&UnigramEntry> {
        self.unigrams
            .get(id)
            .ok_or_else(|| Error::UnknownWord(format!("word id {}", id)))
    }
}

fn check_order(len: usize) -> Result<()> {
    if len == 0 || len > LargeTrigramModel::MAX_ORDER {
        return Err(Error::UnsupportedOrder(len));
    }
    Ok(())
}
