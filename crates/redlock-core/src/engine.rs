//! Lease lifecycle engine.
//!
//! Drives the attempt → hold → confirm → release cycle in a background task
//! and reports it as an ordered channel of [`LockEvent`]s. After a lost or
//! relinquished lease the engine starts over with a rotated owner token until
//! it is stopped.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::algorithm::LockingAlgorithm;
use crate::client::NodeConnector;
use crate::coordinator::LockingCoordinator;
use crate::delay::silently_cancelled_delay;
use crate::error::LockError;
use crate::events::{AcquisitionSignal, LockEvent, LockState};
use crate::lock_id::LockId;

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldOutcome {
    /// A confirmation failed to reach quorum.
    Lost,
    /// The consumer asked to give the lease up; the cycle restarts.
    Relinquished,
    /// Stop requested or consumer gone.
    Stopped,
}

struct Emitted {
    event: LockEvent,
    ack: Option<oneshot::Sender<()>>,
}

/// Builder and driver of the lease cycle for one resource.
pub struct LockingEngine<K: NodeConnector> {
    coordinator: Arc<LockingCoordinator<K>>,
    lock_id: LockId,
    signal: AcquisitionSignal,
    cancel: CancellationToken,
}

impl<K: NodeConnector> LockingEngine<K> {
    /// Creates an engine for the resource and lease of `lock_id`.
    ///
    /// The first cycle uses `lock_id` as given; every later cycle rotates the
    /// owner token.
    pub fn new(coordinator: Arc<LockingCoordinator<K>>, lock_id: LockId) -> Self {
        Self {
            coordinator,
            lock_id,
            signal: AcquisitionSignal::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn acquisition_signal(mut self, signal: AcquisitionSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Ties the engine to an outer cancellation token.
    ///
    /// Cancelling it stops the engine after releasing any held lease.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Starts the cycle and returns the consumer end.
    ///
    /// Nothing touches the nodes before this is called.
    pub fn subscribe(self) -> LockingStream {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(LockState::Idle);
        let (current_tx, current_rx) = watch::channel(None);
        let (relinquish_tx, relinquish_rx) = watch::channel(None);
        let cancel = self.cancel.clone();

        let driver = EngineDriver {
            coordinator: self.coordinator,
            signal: self.signal,
            cancel: self.cancel,
            events: event_tx,
            state: state_tx,
            current: current_tx,
            relinquish: relinquish_rx,
        };
        let task = tokio::spawn(driver.run(self.lock_id));

        LockingStream {
            events: event_rx,
            pending_ack: None,
            state: state_rx,
            current: current_rx,
            relinquish: relinquish_tx,
            cancel,
            task: Some(task),
        }
    }
}

struct EngineDriver<K: NodeConnector> {
    coordinator: Arc<LockingCoordinator<K>>,
    signal: AcquisitionSignal,
    cancel: CancellationToken,
    events: mpsc::Sender<Emitted>,
    state: watch::Sender<LockState>,
    current: watch::Sender<Option<LockId>>,
    /// Owner token of the cycle the consumer wants to give up.
    relinquish: watch::Receiver<Option<Uuid>>,
}

impl<K: NodeConnector> EngineDriver<K> {
    async fn run(self, first: LockId) {
        let mut lock_id = first;

        loop {
            if self.coordinator.is_disposed() {
                let e = LockError::InvalidState("locking coordinator disposed under the engine".to_string());
                error!(lock.resource = %lock_id.resource(), error = %e, "locking engine aborted");
                break;
            }

            self.state.send_replace(LockState::Attempting);
            self.current.send_replace(Some(lock_id.clone()));

            if !self.attempt(&lock_id).await {
                break;
            }

            self.state.send_replace(LockState::Holding);
            let mut announced = false;
            let outcome = if self.signal == AcquisitionSignal::OnAcquisition {
                announced = true;
                if self.emit(LockEvent::Acquired).await {
                    self.hold(&lock_id, &mut announced).await
                } else {
                    HoldOutcome::Stopped
                }
            } else {
                self.hold(&lock_id, &mut announced).await
            };

            if outcome == HoldOutcome::Lost && announced {
                self.emit(LockEvent::HeldLost).await;
            }

            self.state.send_replace(LockState::Releasing);
            self.release(&lock_id, announced).await;
            self.state.send_replace(LockState::Released);
            self.current.send_replace(None);

            if outcome == HoldOutcome::Stopped || self.cancel.is_cancelled() {
                break;
            }

            lock_id = lock_id.rotated();
        }

        debug!("locking engine finished");
    }

    /// Retries acquisition with jittered backoff. Returns `false` when stopped.
    async fn attempt(&self, lock_id: &LockId) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if self.coordinator.is_disposed() {
                let e = LockError::InvalidState("locking coordinator disposed while attempting".to_string());
                error!(lock.resource = %lock_id.resource(), error = %e, "lock acquisition aborted");
                return false;
            }

            if self.coordinator.try_acquire_lock(lock_id).await {
                info!("distributed lock acquired for {}", lock_id.resource());
                return true;
            }

            debug!("unable to acquire the lock on {}, retrying", lock_id.resource());
            let wait = LockingAlgorithm::random_retry_interval(lock_id);
            if !silently_cancelled_delay(wait, &self.cancel).await {
                return false;
            }
        }
    }

    /// Confirms the lease every confirmation interval until it is lost or given up.
    async fn hold(&self, lock_id: &LockId, announced: &mut bool) -> HoldOutcome {
        info!("entering lock retaining mode for {}", lock_id.resource());
        let interval = LockingAlgorithm::calculate_confirmation_interval(lock_id);
        let mut relinquish = self.relinquish.clone();
        let mut next_confirmation = Instant::now() + interval;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return HoldOutcome::Stopped,
                changed = relinquish.changed() => {
                    if changed.is_err() {
                        return HoldOutcome::Stopped;
                    }
                    // requests aimed at an earlier cycle carry an old token
                    if *relinquish.borrow_and_update() == Some(lock_id.owner_token()) {
                        info!("relinquishing the lock on {}", lock_id.resource());
                        return HoldOutcome::Relinquished;
                    }
                    continue;
                }
                _ = tokio::time::sleep_until(next_confirmation) => {}
            }

            if !self.coordinator.try_confirm_the_lock(lock_id).await {
                warn!("lost the lock on {}: confirmation failed", lock_id.resource());
                return HoldOutcome::Lost;
            }
            next_confirmation = Instant::now() + interval;

            if !*announced {
                *announced = true;
                if !self.emit(LockEvent::Acquired).await {
                    return HoldOutcome::Stopped;
                }
            }
        }
    }

    async fn release(&self, lock_id: &LockId, announced: bool) {
        if announced {
            self.emit(LockEvent::ReleaseStarted).await;
        }

        info!("releasing the lock on {}", lock_id.resource());
        let released = self.coordinator.try_release_the_lock(lock_id).await;
        if released {
            info!("distributed lock released for {}", lock_id.resource());
        } else {
            debug!("lock on {} not released by a quorum, it will expire", lock_id.resource());
        }

        if announced {
            self.emit(LockEvent::Released).await;
        }
    }

    /// Sends `event` and, for hand-off events, waits until the consumer asks
    /// for the next one. Returns `false` once the consumer is gone, which also
    /// stops the engine.
    async fn emit(&self, event: LockEvent) -> bool {
        let (ack, acked) = if event.requires_handoff() {
            let (ack, acked) = oneshot::channel();
            (Some(ack), Some(acked))
        } else {
            (None, None)
        };

        if self.events.send(Emitted { event, ack }).await.is_err() {
            debug!(event = %event, "lock event consumer gone, stopping the engine");
            self.cancel.cancel();
            return false;
        }

        if let Some(acked) = acked {
            // Err means the consumer dropped the stream; nothing left to wait for.
            let _ = acked.await;
        }
        true
    }
}

/// Consumer end of a [`LockingEngine`].
///
/// Events arrive in strict temporal order. Dropping the stream stops the
/// engine; a held lease is still released.
pub struct LockingStream {
    events: mpsc::Receiver<Emitted>,
    pending_ack: Option<oneshot::Sender<()>>,
    state: watch::Receiver<LockState>,
    current: watch::Receiver<Option<LockId>>,
    relinquish: watch::Sender<Option<Uuid>>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LockingStream {
    /// Waits for the next event. `None` once the engine has finished.
    ///
    /// Calling `next` again acknowledges the previous event: after
    /// [`LockEvent::HeldLost`] or [`LockEvent::ReleaseStarted`] the engine
    /// only releases the lease once the consumer comes back for more.
    pub async fn next(&mut self) -> Option<LockEvent> {
        if let Some(ack) = self.pending_ack.take() {
            let _ = ack.send(());
        }

        let emitted = self.events.recv().await?;
        self.pending_ack = emitted.ack;
        Some(emitted.event)
    }

    pub fn state(&self) -> LockState {
        *self.state.borrow()
    }

    /// Lock id of the current cycle, if any.
    pub fn current_lock(&self) -> Option<LockId> {
        self.current.borrow().clone()
    }

    /// Gives up a held lease: the engine releases it and starts over.
    ///
    /// Ignored unless the engine is holding. The request only applies to the
    /// lease held at the time of the call, never to a later one.
    pub fn relinquish(&self) {
        if self.state() != LockState::Holding {
            return;
        }
        if let Some(lock_id) = self.current_lock() {
            self.relinquish.send_replace(Some(lock_id.owner_token()));
        }
    }

    /// Requests the engine to release and finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops the engine and drains the remaining events until it has finished.
    pub async fn shutdown(mut self) {
        self.stop();
        while self.next().await.is_some() {}
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "locking engine task failed");
        }
    }
}

impl Drop for LockingStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
