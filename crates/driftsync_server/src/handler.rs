//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::hub::SubscriptionHub;
use crate::log::ServerChangeLog;
use crate::registry::ClientRegistry;
use driftsync_protocol::{
    fetch_batch, is_conflict, requires_full_resync, resolve, Operation, PullRequest, PushRequest,
    PushResponse, RegisterRequest, SyncBatch, SyncClient,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The hub's change log.
    pub log: Arc<ServerChangeLog>,
    /// Known replicas.
    pub registry: Arc<ClientRegistry>,
    /// Real-time fan-out.
    pub hub: Arc<SubscriptionHub>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        let hub = Arc::new(SubscriptionHub::new(
            config.queue_capacity,
            config.subscription_idle_ttl,
        ));
        Self {
            config,
            log,
            registry: Arc::new(ClientRegistry::new()),
            hub,
        }
    }
}

/// Handles register, pull and push requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a registration request, upserting the client record.
    pub fn handle_register(&self, request: RegisterRequest) -> ServerResult<SyncClient> {
        if request.origin_id.is_empty() {
            return Err(ServerError::InvalidRequest("empty origin id".into()));
        }

        let client = self
            .context
            .registry
            .upsert(&request.origin_id, request.last_sync_version);
        debug!(origin = %client.origin_id, version = client.last_sync_version, "client registered");
        Ok(client)
    }

    /// Handles a pull request.
    ///
    /// Fails with `FullResyncRequired` when the client's cursor
    /// predates retained history; otherwise returns a hashed batch and
    /// advances the client's cursor record.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<SyncBatch> {
        let oldest = self.context.log.oldest_available();
        if requires_full_resync(request.from_version, oldest) {
            warn!(
                origin = %request.origin_id,
                client_version = request.from_version,
                oldest_available = oldest,
                "client is behind retained history"
            );
            return Err(ServerError::FullResyncRequired {
                client_version: request.from_version,
                oldest_available: oldest,
            });
        }

        let limit = request.batch_size.min(self.context.config.max_pull_batch);
        let batch = fetch_batch(request.from_version, limit, |from, limit| {
            Ok::<_, ServerError>(self.context.log.entries_since(from, limit))
        })?;

        if !request.origin_id.is_empty() {
            self.context
                .registry
                .upsert(&request.origin_id, batch.to_version);
        }

        debug!(
            origin = %request.origin_id,
            from = batch.from_version,
            to = batch.to_version,
            count = batch.len(),
            has_more = batch.has_more,
            "pull served"
        );
        Ok(batch)
    }

    /// Handles a push request.
    ///
    /// Entries are processed in ascending version order. Competing
    /// edits are resolved against the latest server entry for the row
    /// with the configured strategy; winners are appended (the log
    /// re-stamps versions, preserving origin and timestamp) and fanned
    /// out to subscribers. Entries the server cannot process come back
    /// in `failed` as `version:tableName`.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        if request.changes.len() > self.context.config.max_push_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many entries: {} > {}",
                request.changes.len(),
                self.context.config.max_push_batch
            )));
        }

        let mut changes = request.changes;
        changes.sort_by_key(|e| e.version);

        let mut applied = 0u64;
        let mut failed = Vec::new();

        for entry in changes {
            let needs_payload = matches!(entry.operation, Operation::Insert | Operation::Update);
            if (needs_payload && entry.payload.is_none()) || entry.pk_value.is_empty() {
                warn!(entry = %entry.describe(), "rejecting malformed entry");
                failed.push(entry.describe());
                continue;
            }

            if let Some(current) = self
                .context
                .log
                .latest_for_row(&entry.table_name, &entry.pk_value)
            {
                if is_conflict(&entry, &current) {
                    let resolution = resolve(&entry, &current, self.context.config.conflict_strategy);
                    if resolution.winner != entry {
                        // Deterministically superseded: not applied, not
                        // failed.
                        debug!(
                            entry = %entry.describe(),
                            decided_by = ?resolution.decided_by,
                            "pushed entry lost conflict resolution"
                        );
                        continue;
                    }
                }
            }

            let stored = self.context.log.append(entry);
            self.context.hub.notify_change(&stored);
            applied += 1;
        }

        debug!(origin = %request.origin_id, applied, failed = failed.len(), "push processed");
        Ok(PushResponse { applied, failed })
    }
}
