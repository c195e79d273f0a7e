//! In-memory reference store.
//!
//! Implements the full storage contract, including change capture:
//! every tracked write appends a log entry stamped with the local
//! origin and capture time unless suppression is enabled. Useful for
//! tests and for embedding the engine without a relational store.

use crate::error::{SyncError, SyncResult};
use crate::store::{ChangeLog, RowStore};
use driftsync_protocol::{
    capture_timestamp, compute_database_hash, to_canonical_json, JsonMap, Operation, SyncLogEntry,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// A declared reference between tables, used to detect dependency
/// violations: a child row may only be written once the parent row it
/// points at is present.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Table holding the referencing column.
    pub child_table: String,
    /// Referencing column in the child table.
    pub column: String,
    /// Table the reference points into.
    pub parent_table: String,
    /// Primary-key column of the parent table.
    pub parent_key: String,
}

impl ForeignKey {
    /// Declares a reference from `child_table.column` to
    /// `parent_table.parent_key`.
    pub fn new(
        child_table: impl Into<String>,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            column: column.into(),
            parent_table: parent_table.into(),
            parent_key: parent_key.into(),
        }
    }
}

type Rows = BTreeMap<String, (JsonMap, JsonMap)>;

/// An in-memory store with change capture.
pub struct MemoryStore {
    origin_id: String,
    /// table name -> canonical pk -> (pk, columns).
    tables: RwLock<BTreeMap<String, Rows>>,
    log: RwLock<Vec<SyncLogEntry>>,
    next_version: AtomicI64,
    suppressed: AtomicBool,
    last_server_version: AtomicI64,
    last_push_version: AtomicI64,
    references: RwLock<Vec<ForeignKey>>,
}

impl MemoryStore {
    /// Creates an empty store owned by the given origin.
    pub fn new(origin_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            tables: RwLock::new(BTreeMap::new()),
            log: RwLock::new(Vec::new()),
            next_version: AtomicI64::new(1),
            suppressed: AtomicBool::new(false),
            last_server_version: AtomicI64::new(0),
            last_push_version: AtomicI64::new(0),
            references: RwLock::new(Vec::new()),
        }
    }

    /// Returns the origin id this store captures changes under.
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// Declares a foreign-key reference.
    pub fn add_reference(&self, reference: ForeignKey) {
        self.references.write().push(reference);
    }

    /// Writes a row through the tracked path, capturing a change entry
    /// unless suppression is enabled. Returns the captured version, if
    /// any.
    pub fn local_write(&self, table: &str, pk: &JsonMap, columns: &JsonMap) -> SyncResult<Option<i64>> {
        let before = self.latest_local_version();
        self.upsert_row(table, pk, columns)?;
        let after = self.latest_local_version();
        Ok((after > before).then_some(after))
    }

    /// Deletes a row through the tracked path.
    pub fn local_delete(&self, table: &str, pk: &JsonMap) -> SyncResult<Option<i64>> {
        let before = self.latest_local_version();
        self.delete_row(table, pk)?;
        let after = self.latest_local_version();
        Ok((after > before).then_some(after))
    }

    /// Returns the columns of a row, if present.
    pub fn row(&self, table: &str, pk: &JsonMap) -> Option<JsonMap> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&pk_key(pk)))
            .map(|(_, columns)| columns.clone())
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |rows| rows.len())
    }

    /// Returns the names of all tables that currently hold rows.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Returns all captured log entries (ascending version order).
    pub fn log_entries(&self) -> Vec<SyncLogEntry> {
        self.log.read().clone()
    }

    /// Returns the number of captured log entries.
    pub fn log_len(&self) -> usize {
        self.log.read().len()
    }

    /// Highest version captured in the local log.
    pub fn latest_local_version(&self) -> i64 {
        self.log.read().last().map(|e| e.version).unwrap_or(0)
    }

    /// Hashes the full dataset for out-of-band consistency audits.
    pub fn database_hash(&self) -> SyncResult<String> {
        let names = self.table_names();
        compute_database_hash(&names, |table| {
            Ok(self
                .tables
                .read()
                .get(table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn check_references(&self, table: &str, columns: &JsonMap, tables: &BTreeMap<String, Rows>) -> SyncResult<()> {
        for reference in self.references.read().iter() {
            if reference.child_table != table {
                continue;
            }
            let Some(value) = columns.get(&reference.column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let mut parent_pk = JsonMap::new();
            parent_pk.insert(reference.parent_key.clone(), value.clone());
            let present = tables
                .get(&reference.parent_table)
                .is_some_and(|rows| rows.contains_key(&pk_key(&parent_pk)));

            if !present {
                return Err(SyncError::dependency(
                    table,
                    format!(
                        "{}.{}={} references a {} row that has not arrived",
                        table,
                        reference.column,
                        to_canonical_json(value),
                        reference.parent_table
                    ),
                ));
            }
        }
        Ok(())
    }

    fn capture(&self, operation: Operation, table: &str, pk: &JsonMap, columns: Option<&JsonMap>) {
        if self.suppressed.load(Ordering::SeqCst) {
            return;
        }

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let timestamp = capture_timestamp();
        let entry = match operation {
            Operation::Insert => SyncLogEntry::insert(
                version,
                table,
                pk.clone(),
                columns.cloned().unwrap_or_default(),
                self.origin_id.clone(),
                timestamp,
            ),
            Operation::Update => SyncLogEntry::update(
                version,
                table,
                pk.clone(),
                columns.cloned().unwrap_or_default(),
                self.origin_id.clone(),
                timestamp,
            ),
            Operation::Delete => {
                SyncLogEntry::delete(version, table, pk.clone(), self.origin_id.clone(), timestamp)
            }
        };

        self.log.write().push(entry);
    }
}

fn pk_key(pk: &JsonMap) -> String {
    to_canonical_json(&Value::Object(pk.clone()))
}

impl RowStore for MemoryStore {
    fn upsert_row(&self, table: &str, pk: &JsonMap, columns: &JsonMap) -> SyncResult<()> {
        let existed = {
            let mut tables = self.tables.write();
            self.check_references(table, columns, &tables)?;
            tables
                .entry(table.to_string())
                .or_default()
                .insert(pk_key(pk), (pk.clone(), columns.clone()))
                .is_some()
        };

        let operation = if existed {
            Operation::Update
        } else {
            Operation::Insert
        };
        self.capture(operation, table, pk, Some(columns));
        Ok(())
    }

    fn delete_row(&self, table: &str, pk: &JsonMap) -> SyncResult<()> {
        let existed = {
            let mut tables = self.tables.write();
            tables
                .get_mut(table)
                .and_then(|rows| rows.remove(&pk_key(pk)))
                .is_some()
        };

        // Deleting an absent row is a no-op and captures nothing.
        if existed {
            self.capture(Operation::Delete, table, pk, None);
        }
        Ok(())
    }
}

impl ChangeLog for MemoryStore {
    fn changes_since(&self, from_version: i64, limit: usize) -> SyncResult<Vec<SyncLogEntry>> {
        Ok(self
            .log
            .read()
            .iter()
            .filter(|e| e.version > from_version)
            .take(limit)
            .cloned()
            .collect())
    }

    fn set_capture_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    fn capture_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    fn last_server_version(&self) -> SyncResult<i64> {
        Ok(self.last_server_version.load(Ordering::SeqCst))
    }

    fn set_last_server_version(&self, version: i64) -> SyncResult<()> {
        self.last_server_version.store(version, Ordering::SeqCst);
        Ok(())
    }

    fn last_push_version(&self) -> SyncResult<i64> {
        Ok(self.last_push_version.load(Ordering::SeqCst))
    }

    fn set_last_push_version(&self, version: i64) -> SyncResult<()> {
        self.last_push_version.store(version, Ordering::SeqCst);
        Ok(())
    }
}
