//! Pool controller - the background scaling loop.
//!
//! One controller task runs per pool. On a short fixed tick it samples the
//! shared queue depth against the configured bounds and spawns workers
//! while pressure holds; between ticks it services worker-exit
//! notifications, evicting each reported id from the registry. At shutdown
//! it lets the fleet finish whatever the queue still holds, then asks
//! every live worker to drain and absorbs their exit notices until the
//! registry is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use wf_registry::Registry;

use crate::handler::SharedHandler;
use crate::requirements::Requirements;
use crate::worker::{Worker, WorkerHandle, WorkerId};

/// How often the controller samples queue pressure.
const SCALE_INTERVAL: Duration = Duration::from_micros(100);

/// How often the controller re-checks the queue while draining at shutdown.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on waiting for the queue to drain and for workers to exit.
const SHUTDOWN_WAIT_LIMIT: Duration = Duration::from_secs(30);

pub(crate) type WorkerRegistry<T> = Arc<Registry<WorkerId, WorkerHandle<T>>>;

pub(crate) struct Controller<T> {
    requirements: Requirements,
    registry: WorkerRegistry<T>,
    work_rx: async_channel::Receiver<T>,
    handler: SharedHandler<T>,
    /// Pool-scoped id source; the first worker ever spawned gets id 1.
    next_worker_id: AtomicU64,
    evict_tx: mpsc::Sender<WorkerId>,
    evict_rx: mpsc::Receiver<WorkerId>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<T: Send + 'static> Controller<T> {
    pub(crate) fn new(
        requirements: Requirements,
        registry: WorkerRegistry<T>,
        work_rx: async_channel::Receiver<T>,
        handler: SharedHandler<T>,
        evict_tx: mpsc::Sender<WorkerId>,
        evict_rx: mpsc::Receiver<WorkerId>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            requirements,
            registry,
            work_rx,
            handler,
            next_worker_id: AtomicU64::new(1),
            evict_tx,
            evict_rx,
            shutdown_rx,
        }
    }

    /// Spawn `count` workers, registering each handle before its task
    /// starts so the live count includes it immediately.
    pub(crate) fn spawn_workers(&self, count: usize, idle_timeout: Option<Duration>) {
        for _ in 0..count {
            let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
            let (worker, handle) = Worker::new(
                id,
                self.work_rx.clone(),
                Arc::clone(&self.handler),
                idle_timeout,
                self.evict_tx.clone(),
            );

            self.registry.add(id, handle);
            tokio::spawn(worker.run());
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Pool controller started");

        let mut ticker = tokio::time::interval(SCALE_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.maybe_scale_up(),
                maybe_id = self.evict_rx.recv() => {
                    if let Some(id) = maybe_id {
                        self.registry.remove(&id);
                        debug!(worker_id = id, "Evicted terminated worker");
                    }
                }
                // An error here means the pool was dropped without an
                // explicit shutdown; wind down the same way.
                _ = self.shutdown_rx.recv() => {
                    info!("Pool controller shutting down");
                    break;
                }
            }
        }

        self.drain_workers().await;
    }

    /// One scaling decision: spawn while queued work exceeds the pressure
    /// threshold and headroom to the ceiling remains. The spawn count is
    /// capped by that headroom, so the ceiling is never overshot.
    fn maybe_scale_up(&self) {
        let depth = self.work_rx.len();
        if depth <= self.requirements.min_workers {
            return;
        }

        let live = self.registry.count();
        if live >= self.requirements.max_workers {
            return;
        }

        let spawn_count = self
            .requirements
            .worker_spawn_multiplier
            .min(self.requirements.max_workers - live);

        debug!(
            queue_depth = depth,
            live_workers = live,
            spawn_count = spawn_count,
            "Scaling up"
        );

        self.spawn_workers(spawn_count, Some(self.requirements.idle_timeout));
    }

    /// Graceful wind-down: wait until the fleet has emptied the queue,
    /// ask every live worker to drain, then absorb exit notices until the
    /// registry is empty. Workers finish their current item (and buffered
    /// direct work) before reporting, so this returns only after the
    /// whole fleet has stopped.
    async fn drain_workers(&mut self) {
        let deadline = Instant::now() + SHUTDOWN_WAIT_LIMIT;

        // The submission side is already closed; whatever is still
        // buffered gets processed before the fleet is told to go.
        while !self.work_rx.is_empty() && !self.registry.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        for handle in self.registry.get_all() {
            debug!(worker_id = handle.id(), "Requesting worker drain");
            handle.terminate();
        }

        while !self.registry.is_empty() {
            match tokio::time::timeout(SHUTDOWN_WAIT_LIMIT, self.evict_rx.recv()).await {
                Ok(Some(id)) => {
                    self.registry.remove(&id);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = self.registry.count(),
                        "Timed out waiting for workers to exit"
                    );
                    break;
                }
            }
        }

        info!("Pool controller stopped");
    }
}
