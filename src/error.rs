//! Centralized error types for mailhdr.
//!
//! Header parsing itself never fails: these errors travel between the
//! parsing components and are absorbed by [`crate::header::HeaderParser`],
//! which applies the recovery policy for each of them.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailhdr library.
#[derive(Error, Debug)]
pub enum HeaderError {
    /// No parse strategy or repair rule produced a valid timestamp.
    #[error("Unparseable date: '{input}'")]
    DateParse { input: String },

    /// The character set name is not known to the converter.
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),

    /// The input bytes are not valid in the source charset, or cannot be
    /// represented in the target charset.
    #[error("Cannot convert from {from} to {to}")]
    Conversion { from: String, to: String },

    /// A configured regular expression failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, HeaderError>`.
pub type Result<T> = std::result::Result<T, HeaderError>;

impl HeaderError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `DateParse` variant for the given raw input.
    pub fn date(input: impl Into<String>) -> Self {
        Self::DateParse {
            input: input.into(),
        }
    }
}
