//! Monotonic time source.

use std::time::Instant;

/// Source of monotonic instants used for lease arithmetic.
///
/// Injected into the coordinator so tests can drive time explicitly.
pub trait MonotonicClock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio timer.
///
/// Follows `tokio::time::pause`/`advance`, which keeps timing tests deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl MonotonicClock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl<F> MonotonicClock for F
where
    F: Fn() -> Instant + Send + Sync + 'static,
{
    fn now(&self) -> Instant {
        self()
    }
}
