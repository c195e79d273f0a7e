//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced by pure protocol operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A batch hash did not match its recomputed value.
    ///
    /// This signals corruption in transit or a non-deterministic
    /// serialization bug and is never silently ignored.
    #[error("batch hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Hash carried by the batch.
        expected: String,
        /// Hash recomputed from the batch contents.
        actual: String,
    },

    /// A conflict strategy name could not be parsed.
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    /// An entry violated a structural invariant.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// Canonical serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(String),
}
