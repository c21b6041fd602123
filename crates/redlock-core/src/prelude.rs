//! Convenience prelude for lease types.

pub use crate::algorithm::LockingAlgorithm;
pub use crate::client::{NodeConnector, NodeStoreClient};
pub use crate::clock::{MonotonicClock, TokioClock};
pub use crate::config::{LockingSettings, parse_locking_nodes};
pub use crate::coordinator::LockingCoordinator;
pub use crate::engine::{LockingEngine, LockingStream};
pub use crate::error::{LockError, LockResult};
pub use crate::events::{AcquisitionSignal, LockEvent, LockState};
pub use crate::executor::{LockingServiceExecutor, ServiceExecution};
pub use crate::lock_id::LockId;
pub use crate::node::LockingNode;
