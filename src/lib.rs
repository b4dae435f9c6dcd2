//! `mailhdr`: a best-effort parser for RFC 822/2822 email header blocks.
//!
//! Malformed input is repaired rather than rejected: folded lines, broken
//! encoded words, odd address lists and non-standard dates all produce a
//! usable [`Header`].

pub mod config;
pub mod error;
pub mod header;
pub mod model;
pub mod parser;

pub use config::Options;
pub use error::{HeaderError, Result};
pub use header::{Header, HeaderParser};
pub use model::{Address, FieldValue, Priority};
