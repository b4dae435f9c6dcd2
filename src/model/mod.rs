//! Core data model types for decoded headers and addresses.

pub mod address;
pub mod field;

pub use address::{Address, RawAddress};
pub use field::{FieldValue, Priority};
