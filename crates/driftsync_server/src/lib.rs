//! # DriftSync Server
//!
//! Reference sync hub for DriftSync.
//!
//! This crate provides:
//! - Register, pull and push handlers over a versioned change log
//! - Server-side conflict resolution between competing pushes
//! - Real-time change fan-out with bounded drop-oldest queues
//! - Tombstone retention and stale-client management
//!
//! # Protocol
//!
//! Replicas register with their origin id, pull entries after their
//! cursor (batches carry an integrity hash), and push locally captured
//! entries. The log assigns every accepted entry a strictly increasing
//! version; origins and timestamps are preserved so pulling replicas
//! can skip their own echoes and resolve conflicts deterministically.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod hub;
mod log;
mod registry;
mod retention;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use hub::{DeliveryQueue, SubscriptionHandle, SubscriptionHub};
pub use log::ServerChangeLog;
pub use registry::ClientRegistry;
pub use retention::RetentionAdvisor;
pub use server::SyncServer;
