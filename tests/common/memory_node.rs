//! In-memory lock nodes for coordinator, engine and executor tests.
//!
//! Each node emulates the Redis semantics the coordinator relies on:
//! `SET NX PX`, and token-checked extend/delete. Expiry follows the tokio
//! clock, so paused-time tests stay deterministic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redlock_core::client::{NodeConnector, NodeStoreClient};
use redlock_core::error::{LockError, LockResult};
use redlock_core::lock_id::LockId;
use redlock_core::node::LockingNode;
use tokio::time::Instant;

/// How a node answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeBehavior {
    #[default]
    Healthy,
    /// Refuses connections and fails calls with a connection error.
    Unreachable,
    /// Answers correctly after a delay.
    Delayed(Duration),
    /// Answers every call with this raw response.
    Fixed(String),
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub connects: AtomicUsize,
    pub sets: AtomicUsize,
    pub confirms: AtomicUsize,
    pub releases: AtomicUsize,
    pub closes: AtomicUsize,
}

/// One emulated lock node.
#[derive(Debug, Default)]
pub struct MemoryNode {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    behavior: Mutex<NodeBehavior>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub calls: CallCounts,
}

impl MemoryNode {
    pub fn set_behavior(&self, behavior: NodeBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn behavior(&self) -> NodeBehavior {
        self.behavior.lock().unwrap().clone()
    }

    /// Token currently stored for `resource`, if the key is alive.
    pub fn holder(&self, resource: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries);
        entries.get(resource).map(|(token, _)| token.clone())
    }

    /// Stores `token` for `resource`, as another client would.
    pub fn force_set(&self, resource: &str, token: &str, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(resource.to_string(), (token.to_string(), Instant::now() + ttl));
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn purge_expired(entries: &mut HashMap<String, (String, Instant)>) {
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    fn apply_set(&self, lock_id: &LockId) -> String {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries);
        if entries.contains_key(lock_id.resource()) {
            return String::new();
        }
        entries.insert(
            lock_id.resource().to_string(),
            (lock_id.owner_token().to_string(), Instant::now() + lock_id.lease()),
        );
        "OK".to_string()
    }

    fn apply_confirm(&self, lock_id: &LockId) -> String {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries);
        match entries.get_mut(lock_id.resource()) {
            Some((token, expires_at)) if *token == lock_id.owner_token().to_string() => {
                *expires_at = Instant::now() + lock_id.lease();
                "1".to_string()
            }
            _ => "0".to_string(),
        }
    }

    fn apply_release(&self, lock_id: &LockId) -> String {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries);
        let owned = entries
            .get(lock_id.resource())
            .is_some_and(|(token, _)| *token == lock_id.owner_token().to_string());
        if owned {
            entries.remove(lock_id.resource());
            "1".to_string()
        } else {
            "0".to_string()
        }
    }

    async fn call(&self, apply: impl FnOnce(&Self) -> String) -> LockResult<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        match self.behavior() {
            NodeBehavior::Healthy => Ok(apply(self)),
            NodeBehavior::Unreachable => Err(LockError::connection("connection refused")),
            NodeBehavior::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(apply(self))
            }
            NodeBehavior::Fixed(response) => Ok(response),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A set of emulated nodes addressed by their port.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    nodes: Arc<Vec<Arc<MemoryNode>>>,
}

pub const BASE_PORT: u16 = 7001;

impl MemoryCluster {
    pub fn new(size: usize) -> Self {
        Self {
            nodes: Arc::new((0..size).map(|_| Arc::new(MemoryNode::default())).collect()),
        }
    }

    pub fn node(&self, index: usize) -> &MemoryNode {
        &self.nodes[index]
    }

    /// Locking nodes pointing at this cluster.
    pub fn locking_nodes(&self) -> Vec<LockingNode> {
        (0..self.nodes.len())
            .map(|index| LockingNode::new("memory", BASE_PORT + index as u16))
            .collect()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            cluster: self.clone(),
        }
    }

    /// Number of nodes currently storing a live key for `resource`.
    pub fn holders(&self, resource: &str) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.holder(resource).is_some())
            .count()
    }

    /// Number of nodes storing `token` for `resource`.
    pub fn held_by(&self, resource: &str, token: &str) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.holder(resource).as_deref() == Some(token))
            .count()
    }

    fn lookup(&self, node: &LockingNode) -> Option<Arc<MemoryNode>> {
        let index = node.port().checked_sub(BASE_PORT)? as usize;
        self.nodes.get(index).cloned()
    }
}

pub struct MemoryConnector {
    cluster: MemoryCluster,
}

impl NodeConnector for MemoryConnector {
    type Client = MemoryClient;

    async fn connect(&self, node: &LockingNode) -> LockResult<MemoryClient> {
        let memory = self
            .cluster
            .lookup(node)
            .ok_or_else(|| LockError::connection(format!("unknown node {node}")))?;

        memory.calls.connects.fetch_add(1, Ordering::SeqCst);
        if memory.behavior() == NodeBehavior::Unreachable {
            return Err(LockError::connection(format!("{node} refused the connection")));
        }
        Ok(MemoryClient { node: memory })
    }
}

pub struct MemoryClient {
    node: Arc<MemoryNode>,
}

impl NodeStoreClient for MemoryClient {
    async fn set(&self, lock_id: &LockId) -> LockResult<String> {
        self.node.calls.sets.fetch_add(1, Ordering::SeqCst);
        self.node.call(|node| node.apply_set(lock_id)).await
    }

    async fn confirm(&self, lock_id: &LockId) -> LockResult<String> {
        self.node.calls.confirms.fetch_add(1, Ordering::SeqCst);
        self.node.call(|node| node.apply_confirm(lock_id)).await
    }

    async fn release(&self, lock_id: &LockId) -> LockResult<String> {
        self.node.calls.releases.fetch_add(1, Ordering::SeqCst);
        self.node.call(|node| node.apply_release(lock_id)).await
    }

    async fn close(&self) {
        self.node.calls.closes.fetch_add(1, Ordering::SeqCst);
    }
}
