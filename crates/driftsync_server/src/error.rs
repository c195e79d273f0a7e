//! Error types for the sync server.

use driftsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling sync requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request was malformed or exceeded server limits.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client is behind retained history and must re-baseline.
    #[error("full resync required: client at {client_version}, oldest retained {oldest_available}")]
    FullResyncRequired {
        /// The client's last pulled version.
        client_version: i64,
        /// Oldest version the log still retains.
        oldest_available: i64,
    },

    /// A protocol-level failure (hashing, serialization).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server log rejected an operation.
    #[error("log error: {0}")]
    Log(String),
}
