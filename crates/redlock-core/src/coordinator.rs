//! Quorum coordinator.
//!
//! Fans every lease operation out to all configured nodes in parallel, waits
//! for all of them, and reports success when a quorum agreed. A node that is
//! slow, down or misbehaving only ever costs its own vote.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, instrument, warn};

use crate::algorithm::LockingAlgorithm;
use crate::client::{NodeConnector, NodeStoreClient, is_script_success, is_set_success};
use crate::clock::{MonotonicClock, TokioClock};
use crate::error::{LockError, LockResult};
use crate::lock_id::LockId;
use crate::node::LockingNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOperation {
    Set,
    Confirm,
    Release,
}

impl NodeOperation {
    fn name(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Confirm => "confirm",
            Self::Release => "release",
        }
    }

    fn is_success(self, response: &str) -> bool {
        match self {
            Self::Set => is_set_success(response),
            Self::Confirm | Self::Release => is_script_success(response),
        }
    }
}

/// Connects to `node`, bounded by the node's connect timeout.
async fn connect_node<K: NodeConnector>(connector: &K, node: &LockingNode) -> LockResult<K::Client> {
    match tokio::time::timeout(node.connect_timeout(), connector.connect(node)).await {
        Ok(result) => result,
        Err(_) => Err(LockError::Timeout(node.connect_timeout())),
    }
}

/// Fixed slot owning the client of one node.
///
/// The async mutex keeps at most one operation in flight per node.
struct NodeSlot<C> {
    node: LockingNode,
    client: Mutex<Option<C>>,
}

impl<C: NodeStoreClient> NodeSlot<C> {
    async fn run<K>(
        &self,
        connector: &K,
        operation: NodeOperation,
        lock_id: &LockId,
        cancel: &CancellationToken,
    ) -> bool
    where
        K: NodeConnector<Client = C>,
    {
        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            guard = self.client.lock() => guard,
        };

        if slot.is_none() {
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                connected = connect_node(connector, &self.node) => connected,
            };
            match connected {
                Ok(client) => {
                    info!(node = %self.node, "reconnected to lock node");
                    *slot = Some(client);
                }
                Err(e) => {
                    debug!(node = %self.node, error = %e, "lock node still unreachable");
                    return false;
                }
            }
        }

        let Some(client) = slot.as_ref() else {
            return false;
        };

        let call = async {
            match operation {
                NodeOperation::Set => client.set(lock_id).await,
                NodeOperation::Confirm => client.confirm(lock_id).await,
                NodeOperation::Release => client.release(lock_id).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(node = %self.node, operation = operation.name(), "lock node call cancelled");
                return false;
            }
            outcome = tokio::time::timeout(self.node.operation_timeout(), call) => outcome,
        };

        match outcome {
            Ok(Ok(response)) => {
                let succeeded = operation.is_success(&response);
                if !succeeded {
                    debug!(
                        node = %self.node,
                        operation = operation.name(),
                        response = %response,
                        "lock node refused operation"
                    );
                }
                succeeded
            }
            Ok(Err(e)) => {
                error!(node = %self.node, operation = operation.name(), error = %e, "lock node operation failed");
                if e.is_connection()
                    && let Some(client) = slot.take()
                {
                    client.close().await;
                }
                false
            }
            Err(_) => {
                warn!(
                    node = %self.node,
                    operation = operation.name(),
                    timeout = ?self.node.operation_timeout(),
                    "lock node operation timed out"
                );
                false
            }
        }
    }

    async fn close(&self) {
        if let Some(client) = self.client.lock().await.take() {
            client.close().await;
        }
    }
}

/// Coordinates lease operations across a fixed set of lock nodes.
///
/// The node list is fixed at construction. Each node owns one slot; a client
/// that fails to connect leaves its slot empty and is reconnected lazily on the
/// next operation against that node.
pub struct LockingCoordinator<K: NodeConnector> {
    connector: Arc<K>,
    slots: Vec<Arc<NodeSlot<K::Client>>>,
    clock: Arc<dyn MonotonicClock>,
    lifetime: CancellationToken,
    disposed: AtomicBool,
}

impl<K: NodeConnector> LockingCoordinator<K> {
    /// Connects to every node, using the tokio clock.
    pub async fn connect(nodes: Vec<LockingNode>, connector: K) -> Self {
        Self::connect_with_clock(nodes, connector, TokioClock).await
    }

    /// Connects to every node in parallel.
    ///
    /// A node that cannot be reached is logged and left disconnected; it does
    /// not fail construction.
    pub async fn connect_with_clock(
        nodes: Vec<LockingNode>,
        connector: K,
        clock: impl MonotonicClock,
    ) -> Self {
        info!(nodes = nodes.len(), "creating the locking nodes");
        let connector = Arc::new(connector);

        let mut connect_tasks = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let connector = Arc::clone(&connector);
            let node = node.clone();
            connect_tasks.push(tokio::spawn(async move {
                connect_node(connector.as_ref(), &node).await
            }));
        }

        let mut slots = Vec::with_capacity(nodes.len());
        for (node, task) in nodes.into_iter().zip(connect_tasks) {
            let client = match task.await {
                Ok(Ok(client)) => Some(client),
                Ok(Err(e)) => {
                    warn!(node = %node, error = %e, "failed to connect to lock node");
                    None
                }
                Err(e) => {
                    error!(node = %node, error = %e, "lock node connect task panicked");
                    None
                }
            };
            slots.push(Arc::new(NodeSlot {
                node,
                client: Mutex::new(client),
            }));
        }

        Self {
            connector,
            slots,
            clock: Arc::new(clock),
            lifetime: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LockingNode> {
        self.slots.iter().map(|slot| &slot.node)
    }

    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    pub fn quorum(&self) -> usize {
        LockingAlgorithm::calculate_quorum(self.slots.len())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Token cancelled when the coordinator is disposed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.lifetime.child_token()
    }

    /// Tries to acquire the lease on a quorum of nodes.
    ///
    /// Even with a quorum, the acquisition fails when it took so long that
    /// the remaining lease no longer covers one confirmation interval plus the
    /// safety margin. Any failure releases whatever was set, best effort.
    #[instrument(
        skip(self, lock_id),
        fields(
            lock.resource = %lock_id.resource(),
            backend = "redlock",
            nodes = self.slots.len(),
            nodes_acquired = tracing::field::Empty,
            acquired = tracing::field::Empty,
        )
    )]
    pub async fn try_acquire_lock(&self, lock_id: &LockId) -> bool {
        if !self.is_usable(NodeOperation::Set) {
            return false;
        }

        let start = self.clock.now();
        let successes = self.fan_out(NodeOperation::Set, lock_id).await;
        let end = self.clock.now();

        Span::current().record("nodes_acquired", successes);

        if !LockingAlgorithm::has_sufficient_successes(successes, self.slots.len()) {
            Span::current().record("acquired", false);
            debug!(successes, quorum = self.quorum(), "lock quorum not reached");
            self.fan_out(NodeOperation::Release, lock_id).await;
            return false;
        }

        if !LockingAlgorithm::has_enough_time_before_expire(lock_id, start, end) {
            Span::current().record("acquired", false);
            warn!(
                elapsed_ms = elapsed_millis(start, end),
                "lock acquired too late to be usable, releasing"
            );
            self.fan_out(NodeOperation::Release, lock_id).await;
            return false;
        }

        Span::current().record("acquired", true);
        true
    }

    /// Extends the lease on every node still holding our token.
    #[instrument(
        skip(self, lock_id),
        fields(lock.resource = %lock_id.resource(), backend = "redlock", nodes = self.slots.len())
    )]
    pub async fn try_confirm_the_lock(&self, lock_id: &LockId) -> bool {
        if !self.is_usable(NodeOperation::Confirm) {
            return false;
        }

        let successes = self.fan_out(NodeOperation::Confirm, lock_id).await;
        let confirmed = LockingAlgorithm::has_sufficient_successes(successes, self.slots.len());
        if !confirmed {
            debug!(successes, quorum = self.quorum(), "lock confirmation quorum not reached");
        }
        confirmed
    }

    /// Deletes the key on every node still holding our token.
    ///
    /// The result is advisory: a failed release only means the lease runs
    /// out on its own.
    #[instrument(
        skip(self, lock_id),
        fields(lock.resource = %lock_id.resource(), backend = "redlock", nodes = self.slots.len())
    )]
    pub async fn try_release_the_lock(&self, lock_id: &LockId) -> bool {
        if !self.is_usable(NodeOperation::Release) {
            return false;
        }

        let successes = self.fan_out(NodeOperation::Release, lock_id).await;
        LockingAlgorithm::has_sufficient_successes(successes, self.slots.len())
    }

    /// Cancels in-flight operations and closes every node client.
    ///
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.lifetime.cancel();
        for slot in &self.slots {
            slot.close().await;
        }
        info!("locking coordinator disposed");
    }

    fn is_usable(&self, operation: NodeOperation) -> bool {
        if self.is_disposed() {
            let e = LockError::InvalidState("locking coordinator already disposed".to_string());
            error!(operation = operation.name(), error = %e, "lock operation rejected");
            return false;
        }
        if self.slots.is_empty() {
            debug!(operation = operation.name(), "no lock nodes configured");
            return false;
        }
        true
    }

    /// Runs `operation` on every node in its own task and counts successes.
    ///
    /// All tasks are awaited before tallying; spawned tasks keep running to
    /// completion even if this future is dropped.
    async fn fan_out(&self, operation: NodeOperation, lock_id: &LockId) -> usize {
        let mut tasks = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let slot = Arc::clone(slot);
            let connector = Arc::clone(&self.connector);
            let lock_id = lock_id.clone();
            let cancel = self.lifetime.clone();
            tasks.push(tokio::spawn(async move {
                slot.run(connector.as_ref(), operation, &lock_id, &cancel).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(succeeded) => results.push(succeeded),
                Err(e) => {
                    error!(operation = operation.name(), error = %e, "lock node task panicked");
                    results.push(false);
                }
            }
        }

        results.into_iter().filter(|&succeeded| succeeded).count()
    }
}

impl<K: NodeConnector> Drop for LockingCoordinator<K> {
    fn drop(&mut self) {
        // Clients cannot be closed without an executor; in-flight calls still unwind.
        self.lifetime.cancel();
    }
}

fn elapsed_millis(start: Instant, end: Instant) -> u128 {
    end.saturating_duration_since(start).as_millis()
}
