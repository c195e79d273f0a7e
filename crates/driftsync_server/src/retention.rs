//! Retention wiring: tombstone purge and stale-client pruning.

use crate::log::ServerChangeLog;
use crate::registry::ClientRegistry;
use chrono::{DateTime, Duration, Utc};
use driftsync_protocol::{find_stale_clients, safe_purge_version, SyncClient};
use std::sync::Arc;
use tracing::{debug, info};

/// Advises and applies log retention from the client registry.
///
/// Tombstones (and every other entry) must be retained until all known
/// clients have observed them; this advisor computes that floor and
/// truncates the log accordingly.
pub struct RetentionAdvisor {
    log: Arc<ServerChangeLog>,
    registry: Arc<ClientRegistry>,
    stale_after: Duration,
}

impl RetentionAdvisor {
    /// Creates an advisor over the given log and registry.
    pub fn new(log: Arc<ServerChangeLog>, registry: Arc<ClientRegistry>, stale_after: Duration) -> Self {
        Self {
            log,
            registry,
            stale_after,
        }
    }

    /// Highest version that can be purged without stranding any known
    /// client. `None` when no clients are registered: purging with an
    /// empty registry is disallowed.
    pub fn safe_purge_version(&self) -> Option<i64> {
        safe_purge_version(&self.registry.snapshot())
    }

    /// Purges the log up to the safe floor.
    ///
    /// Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        let Some(floor) = self.safe_purge_version() else {
            debug!("no registered clients; purge disallowed");
            return 0;
        };

        let removed = self.log.purge_through(floor);
        if removed > 0 {
            info!(floor, removed, "purged consumed log entries");
        }
        removed
    }

    /// Reports clients whose last sync predates the staleness
    /// threshold. Flagged clients keep holding the purge floor until
    /// the operator prunes them.
    pub fn stale_clients(&self, now: DateTime<Utc>) -> Vec<SyncClient> {
        find_stale_clients(&self.registry.snapshot(), now, self.stale_after)
    }

    /// Removes stale clients from the registry (the operator action
    /// that releases the purge floor they were holding).
    ///
    /// Returns the number removed.
    pub fn prune_stale(&self, now: DateTime<Utc>) -> usize {
        let stale = self.stale_clients(now);
        let mut removed = 0;
        for client in stale {
            if self.registry.remove(&client.origin_id) {
                info!(origin = %client.origin_id, "pruned stale client");
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{capture_timestamp, default_stale_after, JsonMap, SyncLogEntry};
    use serde_json::json;

    fn make_entry(id: i64) -> SyncLogEntry {
        let mut pk = JsonMap::new();
        pk.insert("id".into(), json!(id));
        let mut payload = JsonMap::new();
        payload.insert("n".into(), json!(id));
        SyncLogEntry::insert(0, "person", pk, payload, "origin-a", capture_timestamp())
    }

    fn advisor() -> (Arc<ServerChangeLog>, Arc<ClientRegistry>, RetentionAdvisor) {
        let log = Arc::new(ServerChangeLog::new());
        let registry = Arc::new(ClientRegistry::new());
        let advisor = RetentionAdvisor::new(Arc::clone(&log), Arc::clone(&registry), default_stale_after());
        (log, registry, advisor)
    }

    #[test]
    fn purge_without_clients_is_disallowed() {
        let (log, _registry, advisor) = advisor();
        log.append(make_entry(1));

        assert_eq!(advisor.safe_purge_version(), None);
        assert_eq!(advisor.purge(), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn purge_respects_the_slowest_client() {
        let (log, registry, advisor) = advisor();
        for i in 0..5 {
            log.append(make_entry(i));
        }
        registry.upsert("fast", 5);
        registry.upsert("slow", 2);

        assert_eq!(advisor.safe_purge_version(), Some(2));
        assert_eq!(advisor.purge(), 2);
        assert_eq!(log.len(), 3);
        assert_eq!(log.oldest_available(), 3);
    }

    #[test]
    fn pruning_stale_clients_releases_the_floor() {
        let (log, registry, advisor) = advisor();
        for i in 0..5 {
            log.append(make_entry(i));
        }
        registry.upsert("active", 5);
        registry.upsert("dormant", 1);

        // The dormant client holds the floor at 1 until it is removed.
        assert_eq!(advisor.safe_purge_version(), Some(1));

        registry.remove("dormant");
        assert_eq!(advisor.safe_purge_version(), Some(5));
        assert_eq!(advisor.purge(), 5);
        assert!(log.is_empty());
    }

    #[test]
    fn prune_stale_removes_only_stale_records() {
        let (_log, registry, advisor) = advisor();
        registry.upsert("active", 5);
        registry.upsert("dormant", 1);

        // Neither is stale right now.
        assert_eq!(advisor.prune_stale(capture_timestamp()), 0);
        assert_eq!(registry.len(), 2);

        // Far enough in the future both are stale.
        let later = capture_timestamp() + chrono::Duration::days(120);
        assert_eq!(advisor.prune_stale(later), 2);
        assert!(registry.is_empty());
    }
}
