//! Error types for lease operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to lock nodes or configuring a lease.
///
/// Coordinator operations never surface these to their callers: per-node
/// failures are logged and counted as "node did not succeed". The error type
/// exists for the node-store boundary and for configuration.
#[derive(Error, Debug)]
pub enum LockError {
    /// A node call did not complete in time.
    #[error("lock node operation timed out after {0:?}")]
    Timeout(Duration),

    /// Node connection failed or was dropped.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Backend-specific error (protocol error, script failure, ...).
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lease duration is not usable.
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    /// Component used in a state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Settings could not be read or validated.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Wraps any displayable failure as a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(Box::new(std::io::Error::other(message.into())))
    }

    /// Wraps any displayable failure as a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(Box::new(std::io::Error::other(message.into())))
    }

    /// Returns true when the failure means the node connection is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type for lease operations.
pub type LockResult<T> = Result<T, LockError>;
