//! Lease settings: resource, lease duration and node list, read from JSON.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LockError, LockResult};
use crate::lock_id::{DEFAULT_LEASE_MILLIS, LockId};
use crate::node::LockingNode;

/// One node entry as it appears in a node list.
///
/// ```json
/// { "address": "localhost", "port": 7001, "operation_timeout_millis": 50 }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeEntry {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub operation_timeout_millis: Option<u64>,
    #[serde(default)]
    pub connect_timeout_millis: Option<u64>,
}

impl NodeEntry {
    fn to_locking_node(&self) -> LockResult<LockingNode> {
        if self.address.trim().is_empty() {
            return Err(LockError::Config("node address must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(LockError::Config(format!(
                "node {} has an invalid port 0",
                self.address
            )));
        }

        let mut node = LockingNode::new(self.address.clone(), self.port);
        if let Some(millis) = self.operation_timeout_millis {
            node = node.with_operation_timeout(Duration::from_millis(millis));
        }
        if let Some(millis) = self.connect_timeout_millis {
            node = node.with_connect_timeout(Duration::from_millis(millis));
        }
        Ok(node)
    }
}

/// Parses a bare JSON array of node entries into locking nodes.
pub fn parse_locking_nodes(json: &str) -> LockResult<Vec<LockingNode>> {
    let entries: Vec<NodeEntry> = serde_json::from_str(json)
        .map_err(|e| LockError::Config(format!("invalid node list: {e}")))?;
    entries.iter().map(NodeEntry::to_locking_node).collect()
}

fn default_lease_millis() -> u64 {
    DEFAULT_LEASE_MILLIS
}

/// Everything a lease holder needs besides a clock.
#[derive(Debug, Clone, Deserialize)]
pub struct LockingSettings {
    pub resource: String,
    #[serde(default = "default_lease_millis")]
    pub lease_millis: u64,
    pub nodes: Vec<NodeEntry>,
}

impl LockingSettings {
    /// Parses and validates settings from a JSON document.
    pub fn from_json_str(json: &str) -> LockResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| LockError::Config(format!("invalid locking settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> LockResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LockError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.resource.trim().is_empty() {
            return Err(LockError::Config("resource must not be empty".to_string()));
        }
        if self.lease_millis == 0 {
            return Err(LockError::Config("lease_millis must be greater than zero".to_string()));
        }
        self.locking_nodes().map(|_| ())
    }

    pub fn locking_nodes(&self) -> LockResult<Vec<LockingNode>> {
        self.nodes.iter().map(NodeEntry::to_locking_node).collect()
    }

    /// A fresh lock id for the configured resource and lease.
    pub fn lock_id(&self) -> LockResult<LockId> {
        LockId::with_lease(self.resource.clone(), Duration::from_millis(self.lease_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NODE_LIST: &str = r#"[
        { "address": "localhost", "port": 7001 },
        { "address": "localhost", "port": 7002 },
        { "address": "localhost", "port": 7003 },
        { "address": "localhost", "port": 7004 },
        { "address": "localhost", "port": 7005 }
    ]"#;

    #[test]
    fn test_parse_node_list() {
        let nodes = parse_locking_nodes(NODE_LIST).unwrap();
        assert_eq!(nodes.len(), 5);
        for (index, node) in nodes.iter().enumerate() {
            assert_eq!(node.host(), "localhost");
            assert_eq!(node.port(), 7001 + index as u16);
        }
    }

    #[test]
    fn test_parse_node_timeouts() {
        let nodes = parse_locking_nodes(
            r#"[{ "address": "redis", "port": 6379, "operation_timeout_millis": 120, "connect_timeout_millis": 900 }]"#,
        )
        .unwrap();
        assert_eq!(nodes[0].operation_timeout(), Duration::from_millis(120));
        assert_eq!(nodes[0].connect_timeout(), Duration::from_millis(900));
    }

    #[test]
    fn test_invalid_node_list() {
        assert!(matches!(parse_locking_nodes("not json"), Err(LockError::Config(_))));
        assert!(matches!(
            parse_locking_nodes(r#"[{ "address": "", "port": 6379 }]"#),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            parse_locking_nodes(r#"[{ "address": "redis", "port": 0 }]"#),
            Err(LockError::Config(_))
        ));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = LockingSettings::from_json_str(
            r#"{ "resource": "billing-job", "nodes": [{ "address": "localhost", "port": 6379 }] }"#,
        )
        .unwrap();
        assert_eq!(settings.lease_millis, DEFAULT_LEASE_MILLIS);

        let lock_id = settings.lock_id().unwrap();
        assert_eq!(lock_id.resource(), "billing-job");
        assert_eq!(lock_id.lease_millis(), DEFAULT_LEASE_MILLIS);
        assert_eq!(settings.locking_nodes().unwrap().len(), 1);
    }

    #[test]
    fn test_settings_validation() {
        assert!(LockingSettings::from_json_str(r#"{ "resource": " ", "nodes": [] }"#).is_err());
        assert!(
            LockingSettings::from_json_str(r#"{ "resource": "job", "lease_millis": 0, "nodes": [] }"#)
                .is_err()
        );
    }

    #[test]
    fn test_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "resource": "job", "lease_millis": 3000, "nodes": {NODE_LIST} }}"#
        )
        .unwrap();

        let settings = LockingSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.lease_millis, 3000);
        assert_eq!(settings.locking_nodes().unwrap().len(), 5);
    }
}
