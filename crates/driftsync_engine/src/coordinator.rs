//! Sync coordinator state machine.

use crate::applier::ChangeApplier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{SuppressionGuard, SyncStore};
use crate::transport::SyncTransport;
use driftsync_protocol::{
    fetch_batch, is_conflict, resolve, verify_batch_hash, PullRequest, PushRequest,
    RegisterRequest, SyncLogEntry,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// The current state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// Registering with the server.
    Registering,
    /// Pulling remote changes.
    Pulling,
    /// Pushing local changes.
    Pushing,
    /// Last cycle completed successfully.
    Synced,
    /// Last cycle failed.
    Error,
    /// Waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the coordinator is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Registering | SyncState::Pulling | SyncState::Pushing
        )
    }

    /// Returns true if a new sync cycle can start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Counters accumulated across sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed sync cycles.
    pub cycles_completed: u64,
    /// Entries pulled and applied.
    pub entries_pulled: u64,
    /// Entries pushed and accepted.
    pub entries_pushed: u64,
    /// Own-origin entries skipped during pulls.
    pub echoes_skipped: u64,
    /// Cycle-level retries performed.
    pub retries: u64,
    /// When the last successful cycle finished.
    pub last_sync_time: Option<Instant>,
    /// Message of the last error, if any.
    pub last_error: Option<String>,
}

/// Outcome of the pull half of a cycle.
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    /// Entries applied locally.
    pub applied: u64,
    /// Own-origin entries skipped without being applied or counted.
    pub echoes_skipped: u64,
    /// Incoming entries dropped because a pending local edit of the
    /// same row won conflict resolution. The pending edit pushes
    /// afterwards and supersedes the remote entry server-side.
    pub conflicts_kept_local: u64,
    /// Batches processed.
    pub batches: u64,
    /// Server version the cursor advanced to.
    pub to_version: i64,
}

/// Outcome of the push half of a cycle.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Entries the server accepted.
    pub pushed: u64,
    /// Entries the server could not process, as `version:tableName`.
    /// Surfaced for diagnosis; the push cursor still advances because a
    /// rejected entry stays rejected on every retry.
    pub rejected: Vec<String>,
    /// Batches processed.
    pub batches: u64,
    /// Local version the cursor advanced to.
    pub to_version: i64,
}

/// Per-batch apply counters.
struct BatchApply {
    applied: u64,
    echoes: u64,
    kept_local: u64,
}

/// Result of a full sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Pull half.
    pub pull: PullOutcome,
    /// Push half.
    pub push: PushOutcome,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

/// Orchestrates pull and push cycles for one replica.
///
/// Cycles are synchronous: one pull or push at a time per store, with
/// entries applied strictly in ascending version order. Concurrent
/// cycles against the same store must be serialized by the caller.
pub struct SyncCoordinator<S: SyncStore, T: SyncTransport> {
    config: SyncConfig,
    store: Arc<S>,
    transport: Arc<T>,
    applier: ChangeApplier<S>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: SyncStore, T: SyncTransport> SyncCoordinator<S, T> {
    /// Creates a new coordinator.
    pub fn new(config: SyncConfig, store: Arc<S>, transport: T) -> Self {
        let applier = ChangeApplier::new(Arc::clone(&store));
        Self {
            config,
            store,
            transport: Arc::new(transport),
            applier,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns a snapshot of the accumulated stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn fail(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Performs a full sync cycle: register, pull, then push.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        if !self.state().can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: "sync".into(),
            });
        }

        let start = Instant::now();

        self.set_state(SyncState::Registering);
        if let Err(e) = self.register() {
            self.fail(&e);
            return Err(e);
        }

        self.set_state(SyncState::Pulling);
        let pull = match self.pull() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.set_state(SyncState::Pushing);
        let push = match self.push() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.entries_pulled += pull.applied;
            stats.entries_pushed += push.pushed;
            stats.echoes_skipped += pull.echoes_skipped;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        let result = SyncCycleResult {
            pull,
            push,
            duration: start.elapsed(),
        };
        info!(
            pulled = result.pull.applied,
            pushed = result.push.pushed,
            echoes = result.pull.echoes_skipped,
            "sync cycle completed"
        );
        Ok(result)
    }

    /// Performs a sync cycle, retrying transient failures with backoff.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.sync() {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry.max_attempts {
                        debug!(error = %e, attempt, "sync attempt failed; will retry");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn register(&self) -> SyncResult<()> {
        let cursor = self.store.last_server_version()?;
        let request = RegisterRequest::new(self.config.origin_id.clone(), cursor);
        let client = self.transport.register(&request)?;
        debug!(origin = %client.origin_id, cursor, "registered with sync server");
        Ok(())
    }

    /// Pulls all available remote changes and applies them locally.
    ///
    /// Change capture stays suppressed for the whole pass, including
    /// error paths, so applied remote changes are never re-logged as
    /// local ones. The cursor advances only after a batch has fully
    /// applied: a crash in between re-fetches the same batch, which is
    /// safe because apply is idempotent.
    pub fn pull(&self) -> SyncResult<PullOutcome> {
        let _suppress = SuppressionGuard::acquire(self.store.as_ref());
        let mut outcome = PullOutcome::default();

        loop {
            let cursor = self.store.last_server_version()?;
            let request = PullRequest::new(
                self.config.origin_id.clone(),
                cursor,
                self.config.batch.batch_size,
            );
            let batch = self.transport.pull(&request)?;
            verify_batch_hash(&batch)?;

            let applied = self.apply_batch(&batch.changes)?;
            self.store.set_last_server_version(batch.to_version)?;

            outcome.applied += applied.applied;
            outcome.echoes_skipped += applied.echoes;
            outcome.conflicts_kept_local += applied.kept_local;
            outcome.batches += 1;
            outcome.to_version = batch.to_version;
            debug!(
                applied = applied.applied,
                echoes = applied.echoes,
                to_version = batch.to_version,
                has_more = batch.has_more,
                "pull batch applied"
            );

            if !batch.has_more {
                break;
            }
        }

        Ok(outcome)
    }

    /// Collects pending (unpushed) local entries keyed by row, keeping
    /// the newest per row. Incoming remote entries are resolved against
    /// these before apply.
    fn pending_by_row(&self) -> SyncResult<HashMap<String, SyncLogEntry>> {
        let cursor = self.store.last_push_version()?;
        let mut pending = HashMap::new();
        for entry in self.store.changes_since(cursor, usize::MAX)? {
            pending.insert(entry.row_key(), entry);
        }
        Ok(pending)
    }

    /// Applies one batch in ascending version order.
    ///
    /// An incoming entry competing with a pending local edit of the
    /// same row goes through conflict resolution first; when the local
    /// edit wins, the remote entry is dropped here and superseded
    /// server-side once the local edit pushes. Entries failing with a
    /// dependency violation are deferred and retried in passes, which
    /// handles out-of-order arrival of dependent rows within a batch
    /// without requiring the source to sort by dependency graph.
    /// Entries still failing after all passes are a hard batch failure,
    /// surfaced individually.
    fn apply_batch(&self, changes: &[SyncLogEntry]) -> SyncResult<BatchApply> {
        let pending = self.pending_by_row()?;
        let mut applied = 0u64;
        let mut echoes = 0u64;
        let mut kept_local = 0u64;
        let mut deferred: Vec<&SyncLogEntry> = Vec::new();

        for entry in changes {
            if entry.origin == self.config.origin_id {
                trace!(entry = %entry.describe(), "skipping own echo");
                echoes += 1;
                continue;
            }

            if let Some(local) = pending.get(&entry.row_key()) {
                if is_conflict(local, entry) {
                    let resolution = resolve(local, entry, self.config.conflict_strategy);
                    if resolution.winner == *local {
                        debug!(
                            entry = %entry.describe(),
                            decided_by = ?resolution.decided_by,
                            "kept pending local edit over incoming entry"
                        );
                        kept_local += 1;
                        continue;
                    }
                }
            }

            match self.applier.apply(entry) {
                Ok(()) => applied += 1,
                Err(SyncError::DependencyViolation { .. }) => {
                    debug!(entry = %entry.describe(), "deferred on dependency violation");
                    deferred.push(entry);
                }
                Err(e) => return Err(e),
            }
        }

        let mut pass = 0;
        while !deferred.is_empty() && pass < self.config.batch.max_retry_passes {
            pass += 1;
            let mut still_failing = Vec::new();

            for entry in deferred {
                match self.applier.apply(entry) {
                    Ok(()) => applied += 1,
                    Err(SyncError::DependencyViolation { .. }) => still_failing.push(entry),
                    Err(e) => return Err(e),
                }
            }

            debug!(pass, remaining = still_failing.len(), "dependency retry pass");
            deferred = still_failing;
        }

        if !deferred.is_empty() {
            let failed: Vec<String> = deferred.iter().map(|e| e.describe()).collect();
            warn!(?failed, "entries still failing after all retry passes");
            return Err(SyncError::RetryExhausted { failed });
        }

        Ok(BatchApply {
            applied,
            echoes,
            kept_local,
        })
    }

    /// Pushes all unsent local changes to the server.
    pub fn push(&self) -> SyncResult<PushOutcome> {
        let mut outcome = PushOutcome::default();

        loop {
            let cursor = self.store.last_push_version()?;
            let batch = fetch_batch(cursor, self.config.batch.batch_size, |from, limit| {
                self.store.changes_since(from, limit)
            })?;

            if batch.is_empty() {
                break;
            }

            let request = PushRequest::new(self.config.origin_id.clone(), batch.changes.clone());
            let response = self.transport.push(&request)?;

            if !response.failed.is_empty() {
                warn!(failed = ?response.failed, "server rejected pushed entries");
                outcome.rejected.extend(response.failed);
            }

            self.store.set_last_push_version(batch.to_version)?;
            outcome.pushed += response.applied;
            outcome.batches += 1;
            outcome.to_version = batch.to_version;
            debug!(
                accepted = response.applied,
                to_version = batch.to_version,
                has_more = batch.has_more,
                "push batch sent"
            );

            if !batch.has_more {
                break;
            }
        }

        Ok(outcome)
    }
}
