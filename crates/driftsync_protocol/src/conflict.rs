//! Conflict detection and resolution.
//!
//! Pure decision functions with no I/O. Resolution never mutates either
//! input entry; it only selects, or synthesizes via a custom merge, the
//! entry to apply.

use crate::entry::SyncLogEntry;
use crate::error::{ProtocolError, ProtocolResult};

/// Strategy for resolving competing edits to the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// The entry with the later timestamp wins; ties break toward the
    /// higher version.
    LastWriteWins,
    /// The remote (server) entry always wins.
    ServerWins,
    /// The local (client) entry always wins.
    ClientWins,
}

impl ConflictStrategy {
    /// Returns the strategy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
        }
    }

    /// Parses a strategy name.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        match name {
            "last-write-wins" => Ok(ConflictStrategy::LastWriteWins),
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "client-wins" => Ok(ConflictStrategy::ClientWins),
            other => Err(ProtocolError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Which strategy decided a resolution, kept for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecidedBy {
    /// Timestamp comparison decided.
    LastWriteWins,
    /// The server entry was chosen unconditionally.
    ServerWins,
    /// The client entry was chosen unconditionally.
    ClientWins,
    /// A caller-supplied merge function decided.
    Custom,
}

/// The outcome of resolving two competing entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The entry to apply.
    pub winner: SyncLogEntry,
    /// The strategy that produced the winner.
    pub decided_by: DecidedBy,
}

/// Returns true iff the two entries are competing edits: same table,
/// same row, different origin.
pub fn is_conflict(a: &SyncLogEntry, b: &SyncLogEntry) -> bool {
    a.same_row(b) && a.origin != b.origin
}

/// Picks the last writer between two entries.
///
/// The entry with the strictly greater timestamp wins; equal timestamps
/// break ties toward the higher version, so the outcome is never
/// ambiguous and does not depend on argument order.
pub fn resolve_last_write_wins<'a>(a: &'a SyncLogEntry, b: &'a SyncLogEntry) -> &'a SyncLogEntry {
    if a.timestamp != b.timestamp {
        if a.timestamp > b.timestamp {
            a
        } else {
            b
        }
    } else if a.version >= b.version {
        a
    } else {
        b
    }
}

/// Resolves a conflict between a local and a remote entry.
///
/// `local` is the entry produced by this replica, `remote` the entry
/// received from the server/peer.
pub fn resolve(local: &SyncLogEntry, remote: &SyncLogEntry, strategy: ConflictStrategy) -> Resolution {
    match strategy {
        ConflictStrategy::LastWriteWins => Resolution {
            winner: resolve_last_write_wins(local, remote).clone(),
            decided_by: DecidedBy::LastWriteWins,
        },
        ConflictStrategy::ServerWins => Resolution {
            winner: remote.clone(),
            decided_by: DecidedBy::ServerWins,
        },
        ConflictStrategy::ClientWins => Resolution {
            winner: local.clone(),
            decided_by: DecidedBy::ClientWins,
        },
    }
}

/// Resolves a conflict with a caller-supplied merge function.
///
/// The merge receives both entries and returns the entry to apply,
/// which may be a synthesized merge of the two.
pub fn resolve_with<F>(local: &SyncLogEntry, remote: &SyncLogEntry, merge: F) -> Resolution
where
    F: FnOnce(&SyncLogEntry, &SyncLogEntry) -> SyncLogEntry,
{
    Resolution {
        winner: merge(local, remote),
        decided_by: DecidedBy::Custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{capture_timestamp, JsonMap};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn pk(id: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("id".into(), json!(id));
        map
    }

    fn entry(version: i64, origin: &str, name: &str, ts: chrono::DateTime<Utc>) -> SyncLogEntry {
        let mut payload = JsonMap::new();
        payload.insert("name".into(), json!(name));
        SyncLogEntry::update(version, "person", pk("p1"), payload, origin, ts)
    }

    #[test]
    fn conflict_requires_same_row_and_different_origin() {
        let ts = capture_timestamp();
        let a = entry(1, "origin-a", "Alice", ts);
        let b = entry(2, "origin-b", "Bob", ts);
        assert!(is_conflict(&a, &b));

        // Same origin is not a conflict.
        let c = entry(3, "origin-a", "Carol", ts);
        assert!(!is_conflict(&a, &c));

        // Different row is not a conflict.
        let mut d = entry(4, "origin-b", "Dave", ts);
        d.pk_value = pk("p2");
        assert!(!is_conflict(&a, &d));
    }

    #[test]
    fn later_timestamp_wins() {
        let t1 = capture_timestamp();
        let t2 = t1 + Duration::milliseconds(5);
        let older = entry(10, "origin-a", "old", t1);
        let newer = entry(2, "origin-b", "new", t2);

        assert_eq!(resolve_last_write_wins(&older, &newer), &newer);
        assert_eq!(resolve_last_write_wins(&newer, &older), &newer);
    }

    #[test]
    fn equal_timestamps_break_toward_higher_version() {
        let ts = capture_timestamp();
        let low = entry(1, "origin-a", "low", ts);
        let high = entry(2, "origin-b", "high", ts);

        assert_eq!(resolve_last_write_wins(&low, &high), &high);
        assert_eq!(resolve_last_write_wins(&high, &low), &high);
    }

    #[test]
    fn resolve_is_order_independent_for_lww() {
        let t1 = capture_timestamp();
        let t2 = t1 + Duration::milliseconds(1);
        let a = entry(1, "origin-a", "a", t1);
        let b = entry(2, "origin-b", "b", t2);

        let forward = resolve(&a, &b, ConflictStrategy::LastWriteWins);
        let backward = resolve(&b, &a, ConflictStrategy::LastWriteWins);
        assert_eq!(forward.winner, backward.winner);
        assert_eq!(forward.winner, b);
        assert_eq!(forward.decided_by, DecidedBy::LastWriteWins);
    }

    #[test]
    fn fixed_strategies() {
        let ts = capture_timestamp();
        let local = entry(1, "origin-a", "local", ts + Duration::milliseconds(10));
        let remote = entry(2, "origin-b", "remote", ts);

        let server = resolve(&local, &remote, ConflictStrategy::ServerWins);
        assert_eq!(server.winner, remote);
        assert_eq!(server.decided_by, DecidedBy::ServerWins);

        let client = resolve(&local, &remote, ConflictStrategy::ClientWins);
        assert_eq!(client.winner, local);
        assert_eq!(client.decided_by, DecidedBy::ClientWins);
    }

    #[test]
    fn custom_merge() {
        let ts = capture_timestamp();
        let local = entry(1, "origin-a", "local", ts);
        let remote = entry(2, "origin-b", "remote", ts);

        let resolution = resolve_with(&local, &remote, |l, r| {
            let mut merged = r.clone();
            if let (Some(lp), Some(mp)) = (l.payload.as_ref(), merged.payload.as_mut()) {
                for (key, value) in lp {
                    mp.entry(key.clone()).or_insert(value.clone());
                }
            }
            merged
        });

        assert_eq!(resolution.decided_by, DecidedBy::Custom);
        assert_eq!(
            resolution.winner.payload.as_ref().and_then(|p| p.get("name")),
            Some(&json!("remote"))
        );
        // Inputs are untouched.
        assert_eq!(local.payload.as_ref().unwrap().get("name"), Some(&json!("local")));
    }

    #[test]
    fn strategy_names_roundtrip() {
        for strategy in [
            ConflictStrategy::LastWriteWins,
            ConflictStrategy::ServerWins,
            ConflictStrategy::ClientWins,
        ] {
            assert_eq!(ConflictStrategy::parse(strategy.as_str()).unwrap(), strategy);
        }

        assert!(matches!(
            ConflictStrategy::parse("merge-3way"),
            Err(ProtocolError::UnknownStrategy(_))
        ));
    }
}
