//! Construction-time configuration for [`LargeTrigramModel`](crate::LargeTrigramModel).
//!
//! Every value the loader needs is carried explicitly in a
//! [`LanguageModelConfig`]; nothing is looked up from ambient state. The
//! config can be built in code or read from a TOML file:
//!
//! ```toml
//! location = "models/wsj5k.DMP"
//! format = "binary"
//! unigram_weight = 0.7
//! log_base = 1.0001
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// The only format tag this engine reads.
pub const BINARY_FORMAT: &str = "binary";

/// Default byte width of one raw bigram record:
/// `word_id: u16, prob_index: u16, backoff_index: u16, first_trigram: u16`.
pub const DEFAULT_BIGRAM_RECORD_BYTES: u64 = 8;

/// Default byte width of one raw trigram record: `word_id: u16, prob_index: u16`.
pub const DEFAULT_TRIGRAM_RECORD_BYTES: u64 = 4;

/// Smallest bigram record that still holds a word id and a probability index.
const MIN_BIGRAM_RECORD_BYTES: u64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelConfig {
    /// Path of the binary dump.
    pub location: PathBuf,
    /// Format tag of the model file.
    pub format: String,
    /// Interpolation weight of the trained unigram distribution against a
    /// uniform floor, in `(0, 1]`.
    pub unigram_weight: f32,
    /// Base of the log domain all returned probabilities are expressed in.
    pub log_base: f64,
    /// Canonical sentence-start spelling.
    pub sentence_start: String,
    /// Canonical sentence-end spelling.
    pub sentence_end: String,
    pub bigram_record_bytes: u64,
    pub trigram_record_bytes: u64,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::new(),
            format: BINARY_FORMAT.to_string(),
            unigram_weight: 0.7,
            log_base: 1.0001,
            sentence_start: "<s>".to_string(),
            sentence_end: "</s>".to_string(),
            bigram_record_bytes: DEFAULT_BIGRAM_RECORD_BYTES,
            trigram_record_bytes: DEFAULT_TRIGRAM_RECORD_BYTES,
        }
    }
}

impl LanguageModelConfig {
    /// Default configuration pointing at the dump at `location`.
    pub fn for_location(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Reads a configuration from a TOML file.
    ///
    /// # Errors
    /// * [`Error::Io`] (`NotFound`) if there is no file at `path`; none is created
    /// * [`Error::Config`] if the file cannot be read or parsed
    /// * [`Error::InvalidConfig`] if a value is out of range
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("language model config {} not found", path.display()),
            )));
        }
        let config: Self = confy::load_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value the loader relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.format.eq_ignore_ascii_case(BINARY_FORMAT) {
            return Err(Error::UnsupportedFormat(self.format.clone()));
        }
        if !(self.unigram_weight > 0.0 && self.unigram_weight <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "unigram weight {} outside (0, 1]",
                self.unigram_weight
            )));
        }
        if !(self.log_base > 1.0) || !self.log_base.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "log base {} must be a finite value greater than 1",
                self.log_base
            )));
        }
        if self.location.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("model location is empty".to_string()));
        }
        if self.bigram_record_bytes < MIN_BIGRAM_RECORD_BYTES {
            return Err(Error::InvalidConfig(format!(
                "bigram record width {} is below {} bytes",
                self.bigram_record_bytes, MIN_BIGRAM_RECORD_BYTES
            )));
        }
        Ok(())
    }
}
