//! Wire request/response shapes and stream events.

use crate::entry::SyncLogEntry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pull request from a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Replica requesting the batch; lets the server advance the
    /// client's cursor record on a successful pull.
    pub origin_id: String,
    /// Cursor to pull from (exclusive).
    pub from_version: i64,
    /// Maximum number of entries to return.
    pub batch_size: usize,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(origin_id: impl Into<String>, from_version: i64, batch_size: usize) -> Self {
        Self {
            origin_id: origin_id.into(),
            from_version,
            batch_size,
        }
    }
}

/// Push request from a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Replica sending the changes.
    pub origin_id: String,
    /// Entries in ascending version order.
    pub changes: Vec<SyncLogEntry>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(origin_id: impl Into<String>, changes: Vec<SyncLogEntry>) -> Self {
        Self {
            origin_id: origin_id.into(),
            changes,
        }
    }
}

/// Push response from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Number of entries accepted and appended.
    pub applied: u64,
    /// Entries the server could not process, as `version:tableName`.
    pub failed: Vec<String>,
}

impl PushResponse {
    /// Creates a response with no failures.
    pub fn accepted(applied: u64) -> Self {
        Self {
            applied,
            failed: Vec::new(),
        }
    }
}

/// Client registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Replica identifier to register.
    pub origin_id: String,
    /// Highest version the replica has pulled so far.
    pub last_sync_version: i64,
}

impl RegisterRequest {
    /// Creates a new registration request.
    pub fn new(origin_id: impl Into<String>, last_sync_version: i64) -> Self {
        Self {
            origin_id: origin_id.into(),
            last_sync_version,
        }
    }
}

/// A discrete event on a real-time subscription stream.
///
/// A `Connected` event precedes the first change event and carries the
/// subscription id; change events follow in notification order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamEvent {
    /// The stream is established.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Identifier of the subscription serving this stream.
        subscription_id: Uuid,
    },
    /// A change entry matched the subscription.
    Change(SyncLogEntry),
}
