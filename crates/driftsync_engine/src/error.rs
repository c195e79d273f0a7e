//! Error types for the sync engine.

use driftsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The underlying store was unreachable or rejected an operation.
    ///
    /// Retried by the caller at a higher level, not by the engine.
    #[error("storage error: {0}")]
    Storage(String),

    /// A change could not be applied because a row it references has
    /// not arrived yet. Recoverable within a cycle via deferred retry.
    #[error("dependency violation applying to {table}: {detail}")]
    DependencyViolation {
        /// Table the change targets.
        table: String,
        /// What was missing.
        detail: String,
    },

    /// Deferred entries still failed after exhausting all retry passes.
    ///
    /// Carries each failing entry as `version:tableName` so operators
    /// can diagnose cyclic or unresolvable dependencies.
    #[error("batch apply retries exhausted; {} entries still failing", .failed.len())]
    RetryExhausted {
        /// Entries still failing, as `version:tableName`.
        failed: Vec<String>,
    },

    /// A batch hash did not match its recomputed value.
    #[error("batch hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Hash carried by the batch.
        expected: String,
        /// Hash recomputed from the batch contents.
        actual: String,
    },

    /// The replica is behind retained history and must re-baseline.
    #[error("full resync required: client at {client_version}, oldest retained {oldest_available}")]
    FullResyncRequired {
        /// The replica's last pulled version.
        client_version: i64,
        /// Oldest version the server still retains.
        oldest_available: i64,
    },

    /// A conflict strategy name could not be parsed.
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    /// A caller supplied structurally invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// Malformed message or serialization failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A sync cycle was started from a state that does not allow it.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a dependency violation.
    pub fn dependency(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DependencyViolation {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if this error can be retried at the cycle level.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Server(_) => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::HashMismatch { expected, actual } => {
                SyncError::HashMismatch { expected, actual }
            }
            ProtocolError::UnknownStrategy(name) => SyncError::UnknownStrategy(name),
            ProtocolError::InvalidEntry(detail) => SyncError::InvalidInput(detail),
            ProtocolError::Serialize(detail) => SyncError::Protocol(detail),
        }
    }
}
