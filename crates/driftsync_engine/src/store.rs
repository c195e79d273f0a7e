//! Storage contracts consumed by the sync engine.
//!
//! The relational store itself is an external collaborator; the engine
//! only requires the capabilities below. The change-capture contract:
//! on every insert/update/delete of a tracked table, when the
//! suppression flag is false, the store appends one log entry stamped
//! with the local origin and capture time; when true, it appends
//! nothing.

use crate::error::SyncResult;
use driftsync_protocol::{JsonMap, SyncLogEntry};

/// Read side of the local change log plus cursor persistence and the
/// capture-suppression flag. All state is store-scoped.
pub trait ChangeLog: Send + Sync {
    /// Returns up to `limit` entries with `version > from_version` in
    /// ascending version order.
    fn changes_since(&self, from_version: i64, limit: usize) -> SyncResult<Vec<SyncLogEntry>>;

    /// Sets the change-capture suppression flag.
    fn set_capture_suppressed(&self, suppressed: bool);

    /// Returns the current suppression flag.
    fn capture_suppressed(&self) -> bool;

    /// Highest server version this replica has pulled and applied.
    fn last_server_version(&self) -> SyncResult<i64>;

    /// Persists the pull cursor.
    fn set_last_server_version(&self, version: i64) -> SyncResult<()>;

    /// Highest local version this replica has pushed.
    fn last_push_version(&self) -> SyncResult<i64>;

    /// Persists the push cursor.
    fn set_last_push_version(&self, version: i64) -> SyncResult<()>;
}

/// Row apply primitives of the storage contract.
///
/// Both operations are idempotent: upserting an existing row overwrites
/// it, deleting an absent row is a no-op success. A write that fails
/// because a referenced row has not arrived yet must surface as
/// [`crate::SyncError::DependencyViolation`].
pub trait RowStore: Send + Sync {
    /// Inserts or overwrites the row identified by `pk`.
    fn upsert_row(&self, table: &str, pk: &JsonMap, columns: &JsonMap) -> SyncResult<()>;

    /// Removes the row identified by `pk`, if present.
    fn delete_row(&self, table: &str, pk: &JsonMap) -> SyncResult<()>;
}

/// Full storage contract required by the coordinator.
pub trait SyncStore: ChangeLog + RowStore {}

impl<T: ChangeLog + RowStore> SyncStore for T {}

/// Scoped change-capture suppression.
///
/// Enables suppression on acquisition and guarantees release on drop,
/// including error paths, so a failed cycle never leaves capture
/// disabled.
pub struct SuppressionGuard<'a> {
    log: &'a dyn ChangeLog,
}

impl<'a> SuppressionGuard<'a> {
    /// Enables suppression on the given store.
    pub fn acquire(log: &'a dyn ChangeLog) -> Self {
        log.set_capture_suppressed(true);
        Self { log }
    }
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.log.set_capture_suppressed(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn guard_releases_on_drop() {
        let store = MemoryStore::new("origin-a");
        assert!(!store.capture_suppressed());

        {
            let _guard = SuppressionGuard::acquire(&store);
            assert!(store.capture_suppressed());
        }
        assert!(!store.capture_suppressed());
    }

    #[test]
    fn guard_releases_on_panic_unwind() {
        let store = MemoryStore::new("origin-a");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SuppressionGuard::acquire(&store);
            panic!("apply failed");
        }));

        assert!(result.is_err());
        assert!(!store.capture_suppressed());
    }
}
