//! Per-replica bookkeeping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-replica state kept by a hub/server.
///
/// Upserted on every successful registration and pull; read by the
/// retention logic to compute the safe purge floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncClient {
    /// Opaque replica identifier.
    pub origin_id: String,
    /// Highest version the client has pulled.
    pub last_sync_version: i64,
    /// When the client last synced.
    pub last_sync_timestamp: DateTime<Utc>,
    /// When the client was first registered.
    pub created_at: DateTime<Utc>,
}

impl SyncClient {
    /// Creates a record for a newly registered client.
    pub fn new(origin_id: impl Into<String>, last_sync_version: i64, now: DateTime<Utc>) -> Self {
        Self {
            origin_id: origin_id.into(),
            last_sync_version,
            last_sync_timestamp: now,
            created_at: now,
        }
    }

    /// Records a successful sync at the given version.
    pub fn touch(&mut self, last_sync_version: i64, now: DateTime<Utc>) {
        self.last_sync_version = last_sync_version;
        self.last_sync_timestamp = now;
    }
}
