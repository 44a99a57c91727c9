//! Vocker Shared - common types for the build core and the CLI
//!
//! This crate contains the error taxonomy and the constants that must agree
//! between the `vocker` library and the `vocker` binary.

pub mod constants;
pub mod errors;

pub use errors::{VockerError, VockerResult};
