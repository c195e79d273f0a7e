//! Applying change entries to a local store.

use crate::error::{SyncError, SyncResult};
use crate::store::RowStore;
use driftsync_protocol::{Operation, SyncLogEntry};
use std::sync::Arc;

/// Applies individual change entries against the row primitives.
///
/// Apply is idempotent because the log is at-least-once-delivered: an
/// Insert for an existing row and an Update for an absent row both
/// succeed as upserts, and deleting an absent row is a no-op. A
/// [`SyncError::DependencyViolation`] from the store is the signal the
/// coordinator uses to defer and retry, not a terminal error.
pub struct ChangeApplier<S: RowStore> {
    store: Arc<S>,
}

impl<S: RowStore> ChangeApplier<S> {
    /// Creates an applier over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Applies one change entry.
    ///
    /// The caller is responsible for enabling capture suppression
    /// around apply so remote changes are not re-logged as local ones.
    pub fn apply(&self, entry: &SyncLogEntry) -> SyncResult<()> {
        match entry.operation {
            Operation::Insert | Operation::Update => {
                let payload = entry.payload.as_ref().ok_or_else(|| {
                    SyncError::InvalidInput(format!(
                        "{} entry {} carries no payload",
                        entry.operation.as_str(),
                        entry.describe()
                    ))
                })?;
                self.store
                    .upsert_row(&entry.table_name, &entry.pk_value, payload)
            }
            Operation::Delete => self.store.delete_row(&entry.table_name, &entry.pk_value),
        }
    }
}
