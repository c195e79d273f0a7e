//! Server-side change log.

use driftsync_protocol::{JsonMap, SyncLogEntry};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

/// The hub's append-only change log.
///
/// Appends assign strictly increasing versions, re-stamping whatever
/// version a pushed entry arrived with; origin and timestamp are
/// preserved. Entries at or below the purge floor can be truncated
/// once every known client has consumed them.
pub struct ServerChangeLog {
    /// Entries in ascending version order.
    entries: RwLock<Vec<SyncLogEntry>>,
    /// Next version to assign.
    next_version: AtomicI64,
    /// Highest version that has been purged away.
    purged_through: AtomicI64,
}

impl ServerChangeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_version: AtomicI64::new(1),
            purged_through: AtomicI64::new(0),
        }
    }

    /// Appends an entry, assigning it the next version.
    ///
    /// Returns the entry as stored.
    pub fn append(&self, mut entry: SyncLogEntry) -> SyncLogEntry {
        // Version assignment happens under the write lock so concurrent
        // appends land in the log in version order.
        let mut entries = self.entries.write();
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        entry.version = version;
        entries.push(entry.clone());
        entry
    }

    /// Returns up to `limit` entries with `version > from_version` in
    /// ascending order.
    pub fn entries_since(&self, from_version: i64, limit: usize) -> Vec<SyncLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.version > from_version)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns true if more than `limit` entries follow `from_version`.
    pub fn has_more_after(&self, from_version: i64, limit: usize) -> bool {
        self.entries
            .read()
            .iter()
            .filter(|e| e.version > from_version)
            .count()
            > limit
    }

    /// Returns the most recent entry touching the given row.
    pub fn latest_for_row(&self, table: &str, pk: &JsonMap) -> Option<SyncLogEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.table_name == table && e.pk_value == *pk)
            .cloned()
    }

    /// Highest version assigned so far.
    pub fn latest_version(&self) -> i64 {
        self.next_version.load(Ordering::SeqCst) - 1
    }

    /// Oldest version that can still be served incrementally.
    pub fn oldest_available(&self) -> i64 {
        self.purged_through.load(Ordering::SeqCst) + 1
    }

    /// Highest version that has been purged away.
    pub fn purged_through(&self) -> i64 {
        self.purged_through.load(Ordering::SeqCst)
    }

    /// Removes all entries with `version <= through`.
    ///
    /// Returns the number of entries removed. The floor is clamped to
    /// the latest assigned version.
    pub fn purge_through(&self, through: i64) -> usize {
        let through = through.min(self.latest_version());
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.version > through);
        let removed = before - entries.len();

        self.purged_through.fetch_max(through, Ordering::SeqCst);
        removed
    }

    /// Returns the number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ServerChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::capture_timestamp;
    use serde_json::json;

    fn pk(id: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("id".into(), json!(id));
        map
    }

    fn make_entry(id: &str, origin: &str) -> SyncLogEntry {
        let mut payload = JsonMap::new();
        payload.insert("name".into(), json!(id));
        // Version 0: the log re-stamps on append.
        SyncLogEntry::insert(0, "person", pk(id), payload, origin, capture_timestamp())
    }

    #[test]
    fn append_assigns_increasing_versions() {
        let log = ServerChangeLog::new();
        let a = log.append(make_entry("p1", "origin-a"));
        let b = log.append(make_entry("p2", "origin-b"));

        assert_eq!(a.version, 1);
        assert_eq!(b.version, 2);
        assert_eq!(log.latest_version(), 2);
        // Origin survives the re-stamp.
        assert_eq!(a.origin, "origin-a");
    }

    #[test]
    fn entries_since_pages_ascending() {
        let log = ServerChangeLog::new();
        for i in 0..5 {
            log.append(make_entry(&format!("p{i}"), "origin-a"));
        }

        let first = log.entries_since(0, 2);
        assert_eq!(first.iter().map(|e| e.version).collect::<Vec<_>>(), vec![1, 2]);
        assert!(log.has_more_after(0, 2));

        let rest = log.entries_since(2, 10);
        assert_eq!(rest.len(), 3);
        assert!(!log.has_more_after(0, 5));
    }

    #[test]
    fn latest_for_row_sees_the_newest_entry() {
        let log = ServerChangeLog::new();
        log.append(make_entry("p1", "origin-a"));
        log.append(make_entry("p2", "origin-a"));
        let latest = log.append(make_entry("p1", "origin-b"));

        let found = log.latest_for_row("person", &pk("p1")).unwrap();
        assert_eq!(found.version, latest.version);
        assert_eq!(found.origin, "origin-b");

        assert!(log.latest_for_row("person", &pk("p9")).is_none());
        assert!(log.latest_for_row("orders", &pk("p1")).is_none());
    }

    #[test]
    fn purge_drops_old_entries() {
        let log = ServerChangeLog::new();
        for i in 0..5 {
            log.append(make_entry(&format!("p{i}"), "origin-a"));
        }

        assert_eq!(log.purge_through(3), 3);
        assert_eq!(log.len(), 2);
        assert_eq!(log.oldest_available(), 4);
        assert_eq!(log.entries_since(0, 10)[0].version, 4);

        // Purging again below the floor removes nothing.
        assert_eq!(log.purge_through(2), 0);
        assert_eq!(log.purged_through(), 3);
    }

    #[test]
    fn purge_floor_is_clamped_to_assigned_versions() {
        let log = ServerChangeLog::new();
        log.append(make_entry("p1", "origin-a"));

        assert_eq!(log.purge_through(100), 1);
        assert_eq!(log.purged_through(), 1);
        assert_eq!(log.oldest_available(), 2);

        // New appends continue from the same sequence.
        let next = log.append(make_entry("p2", "origin-a"));
        assert_eq!(next.version, 2);
    }
}
