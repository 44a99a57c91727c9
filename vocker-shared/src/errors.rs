//! Error types shared across vocker crates.

use thiserror::Error;

/// Result alias used throughout vocker.
pub type VockerResult<T> = Result<T, VockerError>;

/// Errors produced while building, caching or exporting image layers.
///
/// Parse errors are not part of this enum: a bad script line is recorded as a
/// `ParseError` and skipped, it never aborts a build.
#[derive(Debug, Error)]
pub enum VockerError {
    /// Base image could not be acquired (unknown template, network failure).
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// A layer artifact or directory could not be created or read.
    #[error("storage error: {0}")]
    Storage(String),

    /// A command or file write inside the guest filesystem failed.
    #[error("guest access error: {0}")]
    GuestAccess(String),

    /// An operation argument was rejected. Logged and skipped by the pipeline.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VockerError {
    /// Whether the pipeline may log this error and carry on with the next
    /// operation instead of aborting the whole build.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VockerError::Validation(_))
    }
}
