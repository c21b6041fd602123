//! Lock node endpoints.

use std::fmt;
use std::time::Duration;

/// Default time allowed to establish a node connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default time allowed for a single node operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(50);

/// One independent lock-store endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockingNode {
    host: String,
    port: u16,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl LockingNode {
    /// Creates a node with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Same endpoint on another host, with default timeouts.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self::new(host, self.port)
    }

    /// Same endpoint on another port, with default timeouts.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// `host:port`, used in logs.
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for LockingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let node = LockingNode::new("localhost", 7001);
        assert_eq!(node.connect_timeout(), Duration::from_millis(500));
        assert_eq!(node.operation_timeout(), Duration::from_millis(50));
        assert_eq!(node.name(), "localhost:7001");
        assert_eq!(node.to_string(), "localhost:7001");
    }

    #[test]
    fn test_changing_endpoint_resets_timeouts() {
        let node = LockingNode::new("localhost", 7001)
            .with_operation_timeout(Duration::from_millis(200))
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(node.operation_timeout(), Duration::from_millis(200));

        let moved = node.with_port(7002);
        assert_eq!(moved.name(), "localhost:7002");
        assert_eq!(moved.operation_timeout(), DEFAULT_OPERATION_TIMEOUT);

        let rehosted = node.with_host("redis-1");
        assert_eq!(rehosted.name(), "redis-1:7001");
        assert_eq!(rehosted.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }
}
