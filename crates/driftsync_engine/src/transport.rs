//! Transport abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{
    capture_timestamp, compute_batch_hash, PullRequest, PushRequest, PushResponse,
    RegisterRequest, SyncBatch, SyncClient, SyncLogEntry,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Network communication with a sync server.
///
/// Abstracts the transport so different implementations (HTTP, mock
/// for testing, in-memory loopback) can back the same coordinator.
pub trait SyncTransport: Send + Sync {
    /// Registers this replica with the server.
    fn register(&self, request: &RegisterRequest) -> SyncResult<SyncClient>;

    /// Pulls a batch of changes from the server.
    fn pull(&self, request: &PullRequest) -> SyncResult<SyncBatch>;

    /// Pushes local changes to the server.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A mock transport for testing.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    pull_batches: Mutex<VecDeque<SyncBatch>>,
    push_response: Mutex<Option<PushResponse>>,
    pushed: Mutex<Vec<PushRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            pull_batches: Mutex::new(VecDeque::new()),
            push_response: Mutex::new(None),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Builds a batch with a valid hash from the given entries.
    pub fn make_batch(from_version: i64, entries: Vec<SyncLogEntry>, has_more: bool) -> SyncBatch {
        let to_version = entries.last().map(|e| e.version).unwrap_or(from_version);
        let hash = compute_batch_hash(&entries).expect("encode in-memory entries");
        SyncBatch {
            changes: entries,
            from_version,
            to_version,
            has_more,
            hash,
        }
    }

    /// Queues a batch to be returned by the next pull.
    ///
    /// When the queue is empty, pulls return an empty batch at the
    /// requested cursor.
    pub fn queue_pull_batch(&self, batch: SyncBatch) {
        self.pull_batches.lock().push_back(batch);
    }

    /// Overrides the response returned for every push.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Returns all push requests received so far.
    pub fn pushed_requests(&self) -> Vec<PushRequest> {
        self.pushed.lock().clone()
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::transport_fatal("not connected"))
        }
    }
}

impl SyncTransport for MockTransport {
    fn register(&self, request: &RegisterRequest) -> SyncResult<SyncClient> {
        self.ensure_connected()?;
        Ok(SyncClient::new(
            request.origin_id.clone(),
            request.last_sync_version,
            capture_timestamp(),
        ))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<SyncBatch> {
        self.ensure_connected()?;
        Ok(self
            .pull_batches
            .lock()
            .pop_front()
            .unwrap_or_else(|| Self::make_batch(request.from_version, Vec::new(), false)))
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.ensure_connected()?;
        self.pushed.lock().push(request.clone());
        Ok(self
            .push_response
            .lock()
            .clone()
            .unwrap_or_else(|| PushResponse::accepted(request.changes.len() as u64)))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
