//! Runs guarded work only while this process holds the lease.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::algorithm::LockingAlgorithm;
use crate::client::NodeConnector;
use crate::coordinator::LockingCoordinator;
use crate::delay::silently_cancelled_delay;
use crate::engine::LockingEngine;
use crate::error::LockResult;
use crate::events::{AcquisitionSignal, LockEvent};
use crate::lock_id::LockId;

/// A unit of work that must run on at most one process at a time.
pub trait ServiceExecution: Send + Sync + 'static {
    /// Sets the work up and returns. Background activity belongs to tasks
    /// that [`stop`](Self::stop) tears down.
    ///
    /// When the lease goes away while `start` is still running, it is aborted
    /// at its next await point and joined before `stop` is called.
    ///
    /// An error gives the lease up; the executor then competes for it again.
    fn start(&self) -> impl Future<Output = LockResult<()>> + Send;

    /// Stops the work. Must tolerate being called when not started, or twice.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Frees resources once the executor is done with the work.
    fn dispose(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

struct RunningWork {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Starts and stops a [`ServiceExecution`] following the lease.
///
/// The work starts one confirmation interval after the lease is acquired and
/// is stopped before the lease is released, whether the release follows a
/// loss or a shutdown.
pub struct LockingServiceExecutor<K: NodeConnector, S: ServiceExecution> {
    coordinator: Arc<LockingCoordinator<K>>,
    service: Arc<S>,
    lock_id: LockId,
    global: CancellationToken,
    held: Mutex<Option<LockId>>,
    work: AsyncMutex<Option<RunningWork>>,
    stopped: AtomicBool,
}

impl<K: NodeConnector, S: ServiceExecution> LockingServiceExecutor<K, S> {
    pub fn new(service: S, coordinator: Arc<LockingCoordinator<K>>, lock_id: LockId) -> Self {
        Self {
            coordinator,
            service: Arc::new(service),
            lock_id,
            global: CancellationToken::new(),
            held: Mutex::new(None),
            work: AsyncMutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Token cancelled by [`released_stop`](Self::released_stop).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.global.child_token()
    }

    /// Competes for the lease and runs the work while holding it.
    ///
    /// Returns once [`released_stop`](Self::released_stop) was called and the
    /// lease has been released, or when the coordinator became unusable.
    pub async fn locked_start(&self) {
        let mut stream = LockingEngine::new(Arc::clone(&self.coordinator), self.lock_id.clone())
            .acquisition_signal(AcquisitionSignal::OnAcquisition)
            .cancellation(self.global.child_token())
            .subscribe();

        let grace = LockingAlgorithm::calculate_confirmation_interval(&self.lock_id);
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<u64>();
        let mut generation = 0_u64;

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(LockEvent::Acquired) => {
                        self.set_held(stream.current_lock());
                        self.stop_work(None).await;
                        generation += 1;
                        let running = self.spawn_work(grace, generation, failure_tx.clone());
                        *self.work.lock().await = Some(running);
                    }
                    Some(LockEvent::HeldLost) => {
                        debug!("stopping the service for missed confirmation of a previously acquired lock");
                        self.stop_work(None).await;
                    }
                    Some(LockEvent::ReleaseStarted) => {
                        self.stop_work(None).await;
                    }
                    Some(LockEvent::Released) => {
                        self.set_held(None);
                    }
                    None => break,
                },
                Some(failed) = failure_rx.recv() => {
                    if self.stop_work(Some(failed)).await {
                        stream.relinquish();
                    }
                }
            }
        }

        self.stop_work(None).await;
        debug!("locked start loop finished for {}", self.lock_id.resource());
    }

    /// Stops the work and releases the lease. Idempotent.
    pub async fn released_stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.global.cancel();
        info!("the service is stopping");
        if !self.stop_work(None).await {
            self.service.stop().await;
        }

        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(lock_id) = held {
            info!("releasing the lock on {} before shutting the service down", lock_id.resource());
            if self.coordinator.try_release_the_lock(&lock_id).await {
                info!("distributed lock released for {}", lock_id.resource());
            }
        }
        info!("the service stopped");
    }

    /// Stops everything, then disposes the coordinator and the work.
    pub async fn dispose(&self) {
        self.released_stop().await;
        self.coordinator.dispose().await;
        self.service.dispose().await;
    }

    fn set_held(&self, lock_id: Option<LockId>) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = lock_id;
    }

    fn spawn_work(
        &self,
        grace: Duration,
        generation: u64,
        failures: mpsc::UnboundedSender<u64>,
    ) -> RunningWork {
        let cancel = self.global.child_token();
        let token = cancel.clone();
        let service = Arc::clone(&self.service);

        let task = tokio::spawn(async move {
            // A holder displaced by a partition needs one confirmation
            // interval to notice and stop before we start.
            if !silently_cancelled_delay(grace, &token).await {
                return;
            }

            info!("starting the service");
            if let Err(e) = service.start().await {
                error!(error = %e, "guarded service failed");
                let _ = failures.send(generation);
            }
        });

        RunningWork {
            generation,
            cancel,
            task,
        }
    }

    /// Stops the running work, or only the given generation of it.
    ///
    /// The start task is aborted and joined before `stop()` runs, so a
    /// `start()` still in progress cannot outlive the stop. Returns `false`
    /// when there was nothing to stop.
    async fn stop_work(&self, generation: Option<u64>) -> bool {
        let mut work = self.work.lock().await;
        let matches = work
            .as_ref()
            .is_some_and(|running| generation.is_none_or(|wanted| running.generation == wanted));
        if !matches {
            return false;
        }
        let Some(running) = work.take() else {
            return false;
        };

        running.cancel.cancel();
        running.task.abort();
        if let Err(e) = running.task.await
            && !e.is_cancelled()
        {
            error!(error = %e, "guarded service task failed");
        }
        self.service.stop().await;
        true
    }
}
