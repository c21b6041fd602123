//! Redlock timing and quorum arithmetic.
//!
//! Everything here is pure: instants come from an injected
//! [`MonotonicClock`](crate::clock::MonotonicClock), never from the wall clock,
//! so a clock step cannot make an expired lease look valid.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::lock_id::LockId;

/// Timing and quorum functions of the Redlock algorithm.
pub struct LockingAlgorithm;

impl LockingAlgorithm {
    /// Minimum number of agreeing nodes for an operation to succeed.
    ///
    /// For N nodes this is `N/2 + 1`; zero nodes give a quorum of zero.
    pub fn calculate_quorum(node_count: usize) -> usize {
        if node_count == 0 {
            0
        } else {
            node_count / 2 + 1
        }
    }

    /// Checks a success tally against the quorum of `node_count` nodes.
    ///
    /// Always false without nodes: nobody agreed to anything.
    pub fn has_sufficient_successes(success_count: usize, node_count: usize) -> bool {
        node_count > 0 && success_count >= Self::calculate_quorum(node_count)
    }

    /// Lease time left after an acquisition that ran from `start` to `end`, in ms.
    ///
    /// Clamped at zero.
    pub fn calculate_remaining_validity_time(lock_id: &LockId, start: Instant, end: Instant) -> f64 {
        let elapsed_millis = end.saturating_duration_since(start).as_nanos() as f64 / 1_000_000.0;
        (lock_id.lease_millis() as f64 - elapsed_millis).max(0.0)
    }

    /// Buffer for clock drift and processing time: 1% of the lease.
    pub fn calculate_safety_margin(lock_id: &LockId) -> u64 {
        lock_id.lease_millis() / 100
    }

    /// Renewal cadence of a held lease: a third of the lease.
    pub fn calculate_confirmation_interval_millis(lock_id: &LockId) -> u64 {
        lock_id.lease_millis() / 3
    }

    pub fn calculate_confirmation_interval(lock_id: &LockId) -> Duration {
        Duration::from_millis(Self::calculate_confirmation_interval_millis(lock_id))
    }

    /// Jitter window, in ms, between two failed acquisition attempts.
    pub fn calculate_retry_interval_bounds(lock_id: &LockId) -> (u64, u64) {
        let interval = Self::calculate_confirmation_interval_millis(lock_id);
        (interval, interval * 2)
    }

    /// Picks a random wait inside [`calculate_retry_interval_bounds`](Self::calculate_retry_interval_bounds).
    pub fn random_retry_interval(lock_id: &LockId) -> Duration {
        let (low, high) = Self::calculate_retry_interval_bounds(lock_id);
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(low..=high))
    }

    /// Whether a lease acquired between `start` and `end` can still be used.
    ///
    /// The holder needs at least one confirmation interval plus the safety
    /// margin left, otherwise the lease may expire before the first renewal.
    pub fn has_enough_time_before_expire(lock_id: &LockId, start: Instant, end: Instant) -> bool {
        let required =
            Self::calculate_confirmation_interval_millis(lock_id) + Self::calculate_safety_margin(lock_id);
        Self::calculate_remaining_validity_time(lock_id, start, end) >= required as f64
    }
}
