//! Redlock-style distributed leases.
//!
//! A [`LockingCoordinator`] fans lease operations out to a fixed set of
//! independent lock nodes and succeeds on a quorum. A [`LockingEngine`] turns
//! that into a lifecycle of [`LockEvent`]s, and a [`LockingServiceExecutor`]
//! starts and stops guarded work from those events.

pub mod algorithm;
pub mod client;
pub mod clock;
pub mod config;
pub mod coordinator;
mod delay;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod lock_id;
pub mod node;
pub mod prelude;

pub use error::{LockError, LockResult};
pub use prelude::*;
