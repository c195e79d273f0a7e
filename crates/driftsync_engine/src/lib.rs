//! # DriftSync Engine
//!
//! Replica-side synchronization engine for DriftSync.
//!
//! This crate provides:
//! - The [`SyncCoordinator`] pull/push state machine with echo
//!   prevention and dependency-violation retry
//! - The [`ChangeApplier`] with idempotent apply semantics
//! - The storage contracts a store must satisfy ([`ChangeLog`],
//!   [`RowStore`]) and the scoped [`SuppressionGuard`]
//! - Transport abstraction (mock, HTTP client abstraction, loopback)
//! - An in-memory reference store implementing change capture
//!
//! ## Architecture
//!
//! Each cycle is **pull-then-push**: remote changes are applied first
//! under capture suppression, then unsent local changes are pushed.
//! Entries apply strictly in ascending version order; cursors advance
//! only after a batch has fully applied, so a crash mid-cycle replays
//! the same batch against idempotent apply semantics.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod coordinator;
mod error;
mod http;
mod memory;
mod store;
mod transport;

pub use applier::ChangeApplier;
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{
    PullOutcome, PushOutcome, SyncCoordinator, SyncCycleResult, SyncState, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use memory::{ForeignKey, MemoryStore};
pub use store::{ChangeLog, RowStore, SuppressionGuard, SyncStore};
pub use transport::{MockTransport, SyncTransport};
