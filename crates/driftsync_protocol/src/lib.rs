//! # DriftSync Protocol
//!
//! Sync protocol types and pure functions for DriftSync.
//!
//! This crate provides:
//! - [`SyncLogEntry`] change records and the [`SyncBatch`] window type
//! - Canonical JSON encoding and SHA-256 batch/dataset hashing
//! - Batch fetching with integrity hashes ([`fetch_batch`])
//! - Conflict detection and resolution strategies
//! - Tombstone retention and stale-client math
//! - Wire request/response messages and stream events
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod canonical;
mod client;
mod conflict;
mod entry;
mod error;
mod messages;
mod retention;

pub use batch::{
    fetch_batch, verify_batch_hash, BatchConfig, SyncBatch, DEFAULT_BATCH_SIZE,
    DEFAULT_MAX_RETRY_PASSES,
};
pub use canonical::{compute_batch_hash, compute_database_hash, to_canonical_json};
pub use client::SyncClient;
pub use conflict::{
    is_conflict, resolve, resolve_last_write_wins, resolve_with, ConflictStrategy, DecidedBy,
    Resolution,
};
pub use entry::{capture_timestamp, JsonMap, Operation, SyncLogEntry};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{PullRequest, PushRequest, PushResponse, RegisterRequest, StreamEvent};
pub use retention::{
    default_stale_after, find_stale_clients, requires_full_resync, safe_purge_version,
};
