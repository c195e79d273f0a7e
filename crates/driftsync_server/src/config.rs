//! Configuration for the sync server.

use chrono::Duration;
use driftsync_protocol::{default_stale_after, ConflictStrategy};

/// Configuration for the sync hub.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum entries served per pull, regardless of what the client
    /// asked for.
    pub max_pull_batch: usize,
    /// Maximum entries accepted per push.
    pub max_push_batch: usize,
    /// Strategy used to resolve competing pushes to the same row.
    pub conflict_strategy: ConflictStrategy,
    /// Capacity of each subscription's delivery queue.
    pub queue_capacity: usize,
    /// Idle time after which a subscription is swept.
    pub subscription_idle_ttl: Duration,
    /// Inactivity after which a client is reported stale.
    pub stale_client_after: Duration,
}

impl ServerConfig {
    /// Sets the pull batch clamp.
    pub fn with_max_pull_batch(mut self, limit: usize) -> Self {
        self.max_pull_batch = limit;
        self
    }

    /// Sets the push batch clamp.
    pub fn with_max_push_batch(mut self, limit: usize) -> Self {
        self.max_push_batch = limit;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the delivery queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the subscription idle TTL.
    pub fn with_subscription_idle_ttl(mut self, ttl: Duration) -> Self {
        self.subscription_idle_ttl = ttl;
        self
    }

    /// Sets the stale-client threshold.
    pub fn with_stale_client_after(mut self, threshold: Duration) -> Self {
        self.stale_client_after = threshold;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_pull_batch: 1000,
            max_push_batch: 1000,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            queue_capacity: 256,
            subscription_idle_ttl: Duration::minutes(30),
            stale_client_after: default_stale_after(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = ServerConfig::default()
            .with_max_pull_batch(50)
            .with_max_push_batch(25)
            .with_conflict_strategy(ConflictStrategy::ServerWins)
            .with_queue_capacity(8);

        assert_eq!(config.max_pull_batch, 50);
        assert_eq!(config.max_push_batch, 25);
        assert_eq!(config.conflict_strategy, ConflictStrategy::ServerWins);
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_pull_batch, 1000);
        assert_eq!(config.conflict_strategy, ConflictStrategy::LastWriteWins);
        assert_eq!(config.stale_client_after, Duration::days(90));
    }
}
