//! Main sync server.

use crate::config::ServerConfig;
use crate::handler::{HandlerContext, RequestHandler};
use crate::hub::SubscriptionHandle;
use crate::log::ServerChangeLog;
use crate::retention::RetentionAdvisor;
use chrono::{DateTime, Utc};
use driftsync_protocol::{
    JsonMap, PullRequest, PushRequest, PushResponse, RegisterRequest, SyncBatch, SyncClient,
};
use std::sync::Arc;
use uuid::Uuid;

/// The sync hub.
///
/// Dispatches register, pull and push requests against a shared change
/// log, fans out applied entries to live subscriptions, and manages
/// retention from the client registry.
///
/// # Example
///
/// ```
/// use driftsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// // In a real deployment, HTTP endpoints call
/// // server.handle_register(), handle_pull() and handle_push().
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server with an empty log.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_log(config, Arc::new(ServerChangeLog::new()))
    }

    /// Creates a sync server over an existing log.
    pub fn with_log(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, log));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Handles a registration request.
    pub fn handle_register(&self, request: RegisterRequest) -> Result<SyncClient, String> {
        self.handler
            .handle_register(request)
            .map_err(|e| e.to_string())
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> Result<SyncBatch, String> {
        self.handler.handle_pull(request).map_err(|e| e.to_string())
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> Result<PushResponse, String> {
        self.handler.handle_push(request).map_err(|e| e.to_string())
    }

    /// Opens a real-time subscription.
    pub fn subscribe(
        &self,
        table_name: Option<&str>,
        pk_filter: Option<JsonMap>,
        expires_at: Option<DateTime<Utc>>,
    ) -> SubscriptionHandle {
        self.context
            .hub
            .subscribe(Uuid::new_v4(), table_name, pk_filter, expires_at)
    }

    /// Closes a subscription. Idempotent.
    pub fn unsubscribe(&self, id: Uuid) {
        self.context.hub.unsubscribe(id);
    }

    /// Sweeps closed, expired and idle subscriptions.
    pub fn sweep_subscriptions(&self, now: DateTime<Utc>) -> usize {
        self.context.hub.sweep(now)
    }

    /// Returns a retention advisor over this server's log and registry.
    pub fn retention(&self) -> RetentionAdvisor {
        RetentionAdvisor::new(
            Arc::clone(&self.context.log),
            Arc::clone(&self.context.registry),
            self.context.config.stale_client_after,
        )
    }

    /// Highest version assigned so far.
    pub fn latest_version(&self) -> i64 {
        self.context.log.latest_version()
    }

    /// Number of retained log entries.
    pub fn entry_count(&self) -> usize {
        self.context.log.len()
    }

    /// Number of known clients.
    pub fn client_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.context.hub.subscriber_count()
    }
}
