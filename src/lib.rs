//! Redlock-style distributed leases for Rust.
//!
//! Grants a mutual-exclusion lease over a named resource, backed by several
//! independent Redis nodes, and runs a piece of guarded work only while the
//! lease is held.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use redlock::*;
//!
//! struct Report;
//!
//! impl ServiceExecution for Report {
//!     async fn start(&self) -> LockResult<()> {
//!         println!("only one process prints this at a time");
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = RedisLockingProvider::builder()
//!         .node(LockingNode::new("localhost", 7001))
//!         .node(LockingNode::new("localhost", 7002))
//!         .node(LockingNode::new("localhost", 7003))
//!         .build()
//!         .await?;
//!
//!     let executor = provider.create_executor(Report, LockId::new_for("daily-report"));
//!     executor.locked_start().await;
//!     Ok(())
//! }
//! ```
//!
//! # Consuming lock events directly
//!
//! ```rust,no_run
//! use redlock::*;
//!
//! # async fn run(provider: RedisLockingProvider) {
//! let mut stream = provider.create_engine(LockId::new_for("billing")).subscribe();
//! while let Some(event) = stream.next().await {
//!     match event {
//!         LockEvent::Acquired => println!("holding the lease"),
//!         LockEvent::HeldLost | LockEvent::ReleaseStarted => println!("stop working now"),
//!         LockEvent::Released => println!("released"),
//!     }
//! }
//! # }
//! ```
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `redlock-core`: lock identity, timing algorithm, coordinator, engine, executor
//! - `redlock-redis`: Redis node client and provider

// Re-export core types and traits
pub use redlock_core::*;

// Re-export redis backend
#[allow(ambiguous_glob_reexports)]
pub use redlock_redis::*;
