//! Error types for loading and querying binary language models.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The dump does not start with the DARPA trigram header in either byte order.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unsupported dump version {0}")]
    UnsupportedVersion(i32),

    /// Counts, table sizes, or offsets are out of range or inconsistent.
    #[error("corrupt table: {0}")]
    CorruptTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("word not in language model: {0}")]
    UnknownWord(String),

    /// Only unigram and bigram sequences can be scored.
    #[error("unsupported n-gram order: {0}")]
    UnsupportedOrder(usize),

    #[error("unsupported language model format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration error: {0}")]
    Config(#[from] confy::ConfyError),
}

pub type Result<T> = std::result::Result<T, Error>;
