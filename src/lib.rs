//! Read-only scoring engine for CMU-Cambridge binary trigram LM dumps.
//!
//! Only the unigram table, the vocabulary, and the small quantized
//! probability tables are read eagerly. Bigram follower lists stay on disk
//! and are paged in from a read-only memory mapping the first time a word is
//! used as bigram context, then kept for the life of the model.
//!
//! # Usage
//! ```no_run
//! use noload_ngram::{LanguageModelConfig, LargeTrigramModel};
//!
//! let model = LargeTrigramModel::load(LanguageModelConfig::for_location("wsj5k.DMP"))?;
//! let unigram = model.score(&["president"])?;
//! let bigram = model.score(&["the", "president"])?;
//! println!("{} {}", unigram, bigram);
//! # Ok::<(), noload_ngram::Error>(())
//! ```

pub mod config;
pub mod dump_reader;
pub mod error;
pub mod follower_cache;
pub mod log_math;
pub mod model;
pub mod unigram;
pub mod vocabulary;

/// Dense word identifier, `0..number_of_unigrams`.
pub type WordId = u32;

pub use config::LanguageModelConfig;
pub use dump_reader::endian::Endian;
pub use dump_reader::{DumpHeader, TrigramTables};
pub use error::{Error, Result};
pub use follower_cache::{FollowerBlock, FollowerEntry};
pub use log_math::LogMath;
pub use model::LargeTrigramModel;
pub use unigram::UnigramEntry;
