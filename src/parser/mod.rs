//! Header parsing building blocks: tokenizing, text decoding, addresses,
//! parameters, boundaries and dates.

pub mod address;
pub mod attribute;
pub mod boundary;
pub mod charset;
pub mod date;
pub mod encoded_word;
pub mod native;
pub mod tokenizer;
