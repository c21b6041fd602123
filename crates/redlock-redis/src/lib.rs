//! Redis backend for Redlock leases.

pub mod client;
pub mod provider;

pub use client::{RedisNodeClient, RedisNodeConnector};
pub use provider::{RedisLockingCoordinator, RedisLockingProvider, RedisLockingProviderBuilder};
