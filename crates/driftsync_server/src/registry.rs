//! Per-replica client registry.

use driftsync_protocol::{capture_timestamp, SyncClient};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Tracks every replica known to the hub.
///
/// Records are upserted on registration and on every successful pull;
/// the retention logic reads a snapshot to compute the safe purge
/// floor.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, SyncClient>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Creates or updates a client record at the given version.
    pub fn upsert(&self, origin_id: &str, last_sync_version: i64) -> SyncClient {
        let now = capture_timestamp();
        let mut clients = self.clients.write();

        let record = clients
            .entry(origin_id.to_string())
            .and_modify(|c| c.touch(last_sync_version, now))
            .or_insert_with(|| SyncClient::new(origin_id, last_sync_version, now));
        record.clone()
    }

    /// Returns a client record, if known.
    pub fn get(&self, origin_id: &str) -> Option<SyncClient> {
        self.clients.read().get(origin_id).cloned()
    }

    /// Removes a client record, returning true if it existed.
    pub fn remove(&self, origin_id: &str) -> bool {
        self.clients.write().remove(origin_id).is_some()
    }

    /// Returns a snapshot of all known clients.
    pub fn snapshot(&self) -> Vec<SyncClient> {
        self.clients.read().values().cloned().collect()
    }

    /// Returns the number of known clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if no clients are known.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_then_updates() {
        let registry = ClientRegistry::new();

        let first = registry.upsert("origin-a", 0);
        assert_eq!(first.last_sync_version, 0);
        assert_eq!(registry.len(), 1);

        let second = registry.upsert("origin-a", 42);
        assert_eq!(second.last_sync_version, 42);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_and_remove() {
        let registry = ClientRegistry::new();
        registry.upsert("origin-a", 1);
        registry.upsert("origin-b", 2);

        let mut versions: Vec<i64> = registry
            .snapshot()
            .iter()
            .map(|c| c.last_sync_version)
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);

        assert!(registry.remove("origin-a"));
        assert!(!registry.remove("origin-a"));
        assert_eq!(registry.len(), 1);
    }
}
