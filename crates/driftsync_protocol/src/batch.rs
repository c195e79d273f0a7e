//! Bounded batches over a change log.

use crate::canonical::compute_batch_hash;
use crate::entry::SyncLogEntry;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Default number of entries per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of retry passes over deferred entries.
pub const DEFAULT_MAX_RETRY_PASSES: u32 = 3;

/// Immutable batching parameters supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum entries per fetched batch.
    pub batch_size: usize,
    /// Retry passes over entries deferred on dependency violations.
    pub max_retry_passes: u32,
}

impl BatchConfig {
    /// Creates a configuration with the given batch size.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
        }
    }

    /// Sets the number of retry passes.
    pub fn with_max_retry_passes(mut self, passes: u32) -> Self {
        self.max_retry_passes = passes;
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
        }
    }
}

/// A bounded window over the change log.
///
/// Created fresh per fetch, never mutated, consumed once. `changes` is
/// in ascending version order and `hash` covers the ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    /// Entries in ascending version order.
    pub changes: Vec<SyncLogEntry>,
    /// Cursor the batch was fetched from (exclusive).
    pub from_version: i64,
    /// Version of the last entry, or `from_version` when empty.
    pub to_version: i64,
    /// True iff the batch may not be the true tail of the log.
    pub has_more: bool,
    /// SHA-256 over the canonical encoding of `changes`, lowercase hex.
    pub hash: String,
}

impl SyncBatch {
    /// Returns true if the batch carries no entries.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of entries in the batch.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Fetches one bounded batch from a log source.
///
/// `fetch` receives `(from_version, limit)` and must return up to
/// `limit` entries with `version > from_version` in ascending order.
/// `has_more` is true iff the source returned exactly `batch_size`
/// entries, meaning the batch may not be the true tail.
pub fn fetch_batch<E, F>(from_version: i64, batch_size: usize, mut fetch: F) -> Result<SyncBatch, E>
where
    E: From<ProtocolError>,
    F: FnMut(i64, usize) -> Result<Vec<SyncLogEntry>, E>,
{
    let changes = fetch(from_version, batch_size)?;

    let has_more = changes.len() == batch_size && batch_size > 0;
    let to_version = changes.last().map(|e| e.version).unwrap_or(from_version);
    let hash = compute_batch_hash(&changes).map_err(E::from)?;

    Ok(SyncBatch {
        changes,
        from_version,
        to_version,
        has_more,
        hash,
    })
}

/// Recomputes a batch's hash and compares it to the carried value.
///
/// A mismatch signals corruption or a non-deterministic serialization
/// bug and is surfaced as a distinct error kind.
pub fn verify_batch_hash(batch: &SyncBatch) -> ProtocolResult<()> {
    let actual = compute_batch_hash(&batch.changes)?;
    if actual != batch.hash {
        return Err(ProtocolError::HashMismatch {
            expected: batch.hash.clone(),
            actual,
        });
    }
    Ok(())
}
