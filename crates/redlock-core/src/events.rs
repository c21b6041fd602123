//! Lock lifecycle events and states.

use std::fmt;

/// Transition reported to the consumer of a [`LockingStream`](crate::engine::LockingStream).
///
/// For one acquisition the order is always `Acquired`, optionally `HeldLost`,
/// then `ReleaseStarted` and `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockEvent {
    Acquired,
    HeldLost,
    ReleaseStarted,
    Released,
}

impl LockEvent {
    /// Events the engine waits on before touching the nodes again.
    ///
    /// The consumer must have stopped its guarded work once it asks for the
    /// event following one of these.
    pub fn requires_handoff(self) -> bool {
        matches!(self, Self::HeldLost | Self::ReleaseStarted)
    }
}

impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquired => "lock acquired",
            Self::HeldLost => "lock held lost",
            Self::ReleaseStarted => "lock release started",
            Self::Released => "lock released",
        };
        f.write_str(name)
    }
}

/// Phase of the engine's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockState {
    #[default]
    Idle,
    Attempting,
    Holding,
    Releasing,
    Released,
}

/// When the engine announces [`LockEvent::Acquired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionSignal {
    /// After the first successful confirmation, one confirmation interval in.
    ///
    /// A previous holder cut off by a partition has that interval to fail its
    /// own confirmation and stop.
    #[default]
    AfterFirstConfirmation,
    /// As soon as the acquisition quorum is reached. The consumer is then
    /// responsible for any grace period.
    OnAcquisition,
}
