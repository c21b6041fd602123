//! Node-store client boundary.
//!
//! A backend implements [`NodeConnector`] to open one [`NodeStoreClient`] per
//! configured node. Responses are returned raw; the coordinator decides what
//! counts as success.

use std::future::Future;

use crate::error::LockResult;
use crate::lock_id::LockId;
use crate::node::LockingNode;

/// Response of a successful conditional SET.
pub const SET_SUCCESS: &str = "OK";

/// Response of a successful confirm or release script.
pub const SCRIPT_SUCCESS: &str = "1";

/// Lua script extending the key's expiry only while it still holds our token.
pub const CONFIRM_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// Lua script deleting the key only while it still holds our token.
pub const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// Whether a SET response means the key was set.
pub fn is_set_success(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case(SET_SUCCESS)
}

/// Whether a confirm/release response means the script acted.
pub fn is_script_success(response: &str) -> bool {
    response.trim() == SCRIPT_SUCCESS
}

/// Connection to one lock node.
///
/// `confirm` and `release` must be atomic check-and-act operations on the
/// backend (a server-side script): a get-then-act sequence would let a lease be
/// stolen or dropped between the check and the act.
pub trait NodeStoreClient: Send + Sync + 'static {
    /// `SET resource token NX PX lease`. Success: `"OK"`.
    fn set(&self, lock_id: &LockId) -> impl Future<Output = LockResult<String>> + Send;

    /// Extends the lease if the stored token is ours. Success: `"1"`.
    fn confirm(&self, lock_id: &LockId) -> impl Future<Output = LockResult<String>> + Send;

    /// Deletes the key if the stored token is ours. Success: `"1"`.
    fn release(&self, lock_id: &LockId) -> impl Future<Output = LockResult<String>> + Send;

    /// Closes the connection. Errors are swallowed by the implementation.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens clients for configured nodes.
pub trait NodeConnector: Send + Sync + 'static {
    type Client: NodeStoreClient;

    /// Connects to `node`. Callers bound this by the node's connect timeout.
    fn connect(&self, node: &LockingNode) -> impl Future<Output = LockResult<Self::Client>> + Send;
}
