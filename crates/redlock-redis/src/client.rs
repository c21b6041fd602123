//! Redis node-store client.

use redlock_core::client::{
    CONFIRM_SCRIPT_LUA, NodeConnector, NodeStoreClient, RELEASE_SCRIPT_LUA, SET_SUCCESS,
};
use redlock_core::error::{LockError, LockResult};
use redlock_core::lock_id::LockId;
use redlock_core::node::LockingNode;
use fred::prelude::*;
use fred::types::CustomCommand;
use tracing::{debug, instrument};

/// Connection to a single Redis lock node.
#[derive(Clone)]
pub struct RedisNodeClient {
    client: RedisClient,
    node: LockingNode,
}

impl RedisNodeClient {
    /// Wraps an already connected client.
    pub fn new(client: RedisClient, node: LockingNode) -> Self {
        Self { client, node }
    }

    pub fn node(&self) -> &LockingNode {
        &self.node
    }

    pub fn inner(&self) -> &RedisClient {
        &self.client
    }

    async fn eval(&self, script: &'static str, args: Vec<RedisValue>) -> LockResult<String> {
        let mut command: Vec<RedisValue> = vec![script.into(), 1_i64.into()];
        command.extend(args);

        let cmd = CustomCommand::new_static("EVAL", None, false);
        let result: i64 = self
            .client
            .custom(cmd, command)
            .await
            .map_err(|e| map_redis_error("EVAL", e))?;

        Ok(result.to_string())
    }
}

impl NodeStoreClient for RedisNodeClient {
    #[instrument(skip(self, lock_id), fields(node = %self.node, lock.resource = %lock_id.resource(), backend = "redis"))]
    async fn set(&self, lock_id: &LockId) -> LockResult<String> {
        // SET NX returns nil when the key already exists
        let result: Option<String> = self
            .client
            .set(
                lock_id.resource(),
                lock_id.owner_token().to_string(),
                Some(Expiration::PX(lease_px(lock_id)?)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| map_redis_error("SET NX", e))?;

        Ok(match result {
            Some(_) => SET_SUCCESS.to_string(),
            None => String::new(),
        })
    }

    #[instrument(skip(self, lock_id), fields(node = %self.node, lock.resource = %lock_id.resource(), backend = "redis"))]
    async fn confirm(&self, lock_id: &LockId) -> LockResult<String> {
        self.eval(
            CONFIRM_SCRIPT_LUA,
            vec![
                lock_id.resource().into(),
                lock_id.owner_token().to_string().into(),
                lease_px(lock_id)?.into(),
            ],
        )
        .await
    }

    #[instrument(skip(self, lock_id), fields(node = %self.node, lock.resource = %lock_id.resource(), backend = "redis"))]
    async fn release(&self, lock_id: &LockId) -> LockResult<String> {
        self.eval(
            RELEASE_SCRIPT_LUA,
            vec![
                lock_id.resource().into(),
                lock_id.owner_token().to_string().into(),
            ],
        )
        .await
    }

    async fn close(&self) {
        if let Err(e) = self.client.quit().await {
            debug!(node = %self.node, error = %e, "error while closing Redis connection");
        }
    }
}

/// Opens [`RedisNodeClient`]s for configured nodes.
#[derive(Debug, Clone, Default)]
pub struct RedisNodeConnector {
    password: Option<String>,
}

impl RedisNodeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates every connection with `password`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn config_for(&self, node: &LockingNode) -> LockResult<RedisConfig> {
        let url = match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", password, node.host(), node.port()),
            None => format!("redis://{}:{}", node.host(), node.port()),
        };

        RedisConfig::from_url(&url).map_err(|e| {
            LockError::Config(format!("invalid Redis endpoint {}: {}", node, e))
        })
    }
}

impl NodeConnector for RedisNodeConnector {
    type Client = RedisNodeClient;

    async fn connect(&self, node: &LockingNode) -> LockResult<RedisNodeClient> {
        let config = self.config_for(node)?;
        let client = RedisClient::new(config, None, None, None);
        client.connect();

        if let Err(e) = client.wait_for_connect().await {
            let _ = client.quit().await;
            return Err(LockError::connection(format!(
                "failed to connect to Redis node {}: {}",
                node, e
            )));
        }

        debug!(node = %node, "connected to Redis lock node");
        Ok(RedisNodeClient::new(client, node.clone()))
    }
}

/// Lease in the signed milliseconds `PX` and `PEXPIRE` expect.
fn lease_px(lock_id: &LockId) -> LockResult<i64> {
    i64::try_from(lock_id.lease_millis()).map_err(|_| {
        LockError::InvalidLease(format!("lease of {}ms does not fit PX", lock_id.lease_millis()))
    })
}

/// Connection-level failures evict the client so the node is reconnected.
fn map_redis_error(command: &str, e: RedisError) -> LockError {
    match e.kind() {
        RedisErrorKind::IO | RedisErrorKind::Canceled | RedisErrorKind::Timeout => {
            LockError::connection(format!("Redis {} failed: {}", command, e))
        }
        _ => LockError::backend(format!("Redis {} failed: {}", command, e)),
    }
}
