//! Redis locking provider.

use std::sync::Arc;
use std::time::Instant;

use redlock_core::clock::{MonotonicClock, TokioClock};
use redlock_core::config::LockingSettings;
use redlock_core::coordinator::LockingCoordinator;
use redlock_core::engine::LockingEngine;
use redlock_core::error::{LockError, LockResult};
use redlock_core::executor::{LockingServiceExecutor, ServiceExecution};
use redlock_core::lock_id::LockId;
use redlock_core::node::LockingNode;

use crate::client::RedisNodeConnector;

/// Coordinator over Redis nodes.
pub type RedisLockingCoordinator = LockingCoordinator<RedisNodeConnector>;

/// Builder for Redis locking provider configuration.
pub struct RedisLockingProviderBuilder {
    nodes: Vec<LockingNode>,
    connector: RedisNodeConnector,
    clock: Arc<dyn MonotonicClock>,
}

impl RedisLockingProviderBuilder {
    /// Creates a new builder with no nodes and the tokio clock.
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            connector: RedisNodeConnector::new(),
            clock: Arc::new(TokioClock),
        }
    }

    /// Adds a Redis node.
    ///
    /// For Redlock, add several independent nodes (ideally 3 or 5).
    pub fn node(mut self, node: LockingNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds multiple Redis nodes.
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = LockingNode>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Adds the nodes listed in `settings`.
    pub fn settings(self, settings: &LockingSettings) -> LockResult<Self> {
        Ok(self.nodes(settings.locking_nodes()?))
    }

    /// Authenticates every node connection with `password`.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.connector = self.connector.with_password(password);
        self
    }

    /// Replaces the monotonic clock used for lease arithmetic.
    pub fn clock(mut self, clock: impl MonotonicClock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Connects to every node and builds the provider.
    ///
    /// Unreachable nodes do not fail the build; they are retried on use.
    ///
    /// # Errors
    ///
    /// Returns an error when no node was configured.
    pub async fn build(self) -> LockResult<RedisLockingProvider> {
        if self.nodes.is_empty() {
            return Err(LockError::Config("no Redis nodes provided".to_string()));
        }

        let clock = self.clock;
        let coordinator = LockingCoordinator::connect_with_clock(
            self.nodes,
            self.connector,
            move || -> Instant { clock.now() },
        )
        .await;

        Ok(RedisLockingProvider {
            coordinator: Arc::new(coordinator),
        })
    }
}

impl Default for RedisLockingProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for Redlock leases backed by Redis nodes.
pub struct RedisLockingProvider {
    coordinator: Arc<RedisLockingCoordinator>,
}

impl RedisLockingProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> RedisLockingProviderBuilder {
        RedisLockingProviderBuilder::new()
    }

    /// Creates a provider for the nodes in `settings`.
    pub async fn from_settings(settings: &LockingSettings) -> LockResult<Self> {
        Self::builder().settings(settings)?.build().await
    }

    pub fn coordinator(&self) -> Arc<RedisLockingCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Creates a lease engine for `lock_id`.
    pub fn create_engine(&self, lock_id: LockId) -> LockingEngine<RedisNodeConnector> {
        LockingEngine::new(self.coordinator(), lock_id)
    }

    /// Wraps `service` so it only runs while holding `lock_id`.
    pub fn create_executor<S: ServiceExecution>(
        &self,
        service: S,
        lock_id: LockId,
    ) -> LockingServiceExecutor<RedisNodeConnector, S> {
        LockingServiceExecutor::new(service, self.coordinator(), lock_id)
    }

    /// Disposes the shared coordinator.
    pub async fn dispose(&self) {
        self.coordinator.dispose().await;
    }
}
