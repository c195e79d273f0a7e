//! Tombstone retention and stale-client math.
//!
//! Pure functions over a snapshot of [`SyncClient`] records. The server
//! wires these to its registry and log; nothing here performs I/O.

use crate::client::SyncClient;
use chrono::{DateTime, Duration, Utc};

/// Default inactivity threshold after which a client is reported stale.
pub fn default_stale_after() -> Duration {
    Duration::days(90)
}

/// Computes the highest version that can be purged without any known
/// client missing history it has not yet consumed.
///
/// Entries with `version <= floor` are safe to purge. With zero clients
/// there is no safe floor and purging is disallowed.
pub fn safe_purge_version(clients: &[SyncClient]) -> Option<i64> {
    clients.iter().map(|c| c.last_sync_version).min()
}

/// Returns true iff a client whose last pulled version is
/// `client_last_version` can no longer be served incrementally from a
/// log whose oldest retained version is `oldest_available`.
///
/// The client's next pull starts at `client_last_version + 1`; when
/// that predates the oldest retained entry the client must re-baseline.
pub fn requires_full_resync(client_last_version: i64, oldest_available: i64) -> bool {
    client_last_version + 1 < oldest_available
}

/// Reports clients whose last sync predates `now - threshold`.
///
/// Flagged clients are candidates for administrative pruning; they are
/// not excluded from the purge floor until the operator removes them.
pub fn find_stale_clients(
    clients: &[SyncClient],
    now: DateTime<Utc>,
    threshold: Duration,
) -> Vec<SyncClient> {
    let cutoff = now - threshold;
    clients
        .iter()
        .filter(|c| c.last_sync_timestamp < cutoff)
        .cloned()
        .collect()
}
