//! WorkerPool - the public facade over the queue, registry and controller.
//!
//! Construction normalizes the requirements, eagerly spawns the
//! `min_workers` floor (registered before the constructor returns) and
//! starts the controller task. Everything else is thin: submission is a
//! blocking-bounded enqueue, direct dispatch is a registry lookup plus an
//! inbox send, and introspection reads the registry and queue counters.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use wf_registry::Registry;

use crate::controller::{Controller, WorkerRegistry};
use crate::error::PoolError;
use crate::handler::{FnWorkHandler, SharedHandler, WorkHandler};
use crate::requirements::Requirements;
use crate::worker::{WorkerContext, WorkerId};
use crate::Result;

/// Point-in-time snapshot of pool state.
///
/// Counts are instantaneously consistent only up to in-flight
/// scale-up/eviction transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub active_workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

/// Self-scaling worker pool.
///
/// Work submitted through [`submit`](Self::submit) is consumed by any idle
/// worker (competing consumers, no ordering guarantee); the controller
/// grows the fleet under queue pressure up to `max_workers` and scale-up
/// workers retire themselves after `idle_timeout` without work. The
/// `min_workers` floor never times out.
///
/// Dropping the pool without calling [`shutdown`](Self::shutdown) still
/// winds the fleet down: the queue and control channels close and every
/// task exits on its own.
pub struct WorkerPool<T: Send + 'static> {
    requirements: Requirements,

    /// Submission side of the shared bounded queue.
    work_tx: async_channel::Sender<T>,

    /// Live worker handles, keyed by id. The controller adds and evicts;
    /// the facade counts and looks up.
    registry: WorkerRegistry<T>,

    /// One-time-settable handler slot shared with every worker.
    handler: SharedHandler<T>,

    shutdown_tx: broadcast::Sender<()>,

    /// Controller task handle, taken once by `shutdown`.
    controller_handle: Mutex<Option<JoinHandle<()>>>,

    closed: AtomicBool,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool with the given requirements (normalized first).
    ///
    /// Must be called from within a Tokio runtime. The `min_workers`
    /// floor is registered before this returns.
    pub fn new(requirements: Requirements) -> Self {
        let requirements = requirements.normalized();

        let (work_tx, work_rx) = async_channel::bounded(requirements.work_bucket_size);
        let registry: WorkerRegistry<T> = Arc::new(Registry::new());
        let handler: SharedHandler<T> = Arc::new(RwLock::new(None));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (evict_tx, evict_rx) = mpsc::channel(requirements.max_workers);

        let controller = Controller::new(
            requirements,
            Arc::clone(&registry),
            work_rx,
            Arc::clone(&handler),
            evict_tx,
            evict_rx,
            shutdown_rx,
        );

        // Floor workers take no idle timeout; they live until shutdown.
        controller.spawn_workers(requirements.min_workers, None);
        let controller_handle = tokio::spawn(controller.run());

        info!(
            min_workers = requirements.min_workers,
            max_workers = requirements.max_workers,
            work_bucket_size = requirements.work_bucket_size,
            "Worker pool started"
        );

        Self {
            requirements,
            work_tx,
            registry,
            handler,
            shutdown_tx,
            controller_handle: Mutex::new(Some(controller_handle)),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a pool with the library defaults
    /// (`min 1, max 1, bucket 10, multiplier 1, idle 300s`).
    pub fn with_defaults() -> Self {
        Self::new(Requirements::default())
    }

    /// Submit a work item to the shared queue.
    ///
    /// Awaits while the queue is full; backpressure is the contract, not
    /// an error. Fails only once the pool has been shut down.
    pub async fn submit(&self, item: T) -> Result<()> {
        self.work_tx
            .send(item)
            .await
            .map_err(|_| PoolError::PoolClosed)
    }

    /// Install the work handler. The first call wins and returns `true`;
    /// every later call is silently ignored and returns `false`.
    ///
    /// Items consumed before a handler is installed are discarded by the
    /// no-op default.
    pub fn set_work_handler(&self, handler: Arc<dyn WorkHandler<T>>) -> bool {
        let mut slot = self.handler.write();
        if slot.is_some() {
            debug!("Work handler already installed, ignoring");
            return false;
        }

        *slot = Some(handler);
        true
    }

    /// Install an async closure as the work handler. Same one-shot gate
    /// as [`set_work_handler`](Self::set_work_handler).
    pub fn set_work_handler_fn<F, Fut>(&self, func: F) -> bool
    where
        F: Fn(WorkerContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.set_work_handler(Arc::new(FnWorkHandler::new(func)))
    }

    /// Number of live workers at call time.
    pub fn active_worker_count(&self) -> usize {
        self.registry.count()
    }

    /// Number of items currently buffered in the shared queue.
    pub fn queue_depth(&self) -> usize {
        self.work_tx.len()
    }

    /// The normalized requirements this pool runs under.
    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active_workers: self.registry.count(),
            queue_depth: self.work_tx.len(),
            queue_capacity: self.requirements.work_bucket_size,
            min_workers: self.requirements.min_workers,
            max_workers: self.requirements.max_workers,
        }
    }

    /// Deliver an item to one specific worker, bypassing the shared queue.
    ///
    /// Awaits while that worker's inbox is full. An id that was never
    /// issued or whose worker already terminated yields
    /// [`PoolError::WorkerNotFound`]; the item is never rerouted to the
    /// shared queue.
    pub async fn direct_work(&self, worker_id: WorkerId, item: T) -> Result<()> {
        let handle = self
            .registry
            .get(&worker_id)
            .ok_or(PoolError::WorkerNotFound(worker_id))?;

        // The worker can exit between lookup and delivery; that send
        // failure is the same not-found condition.
        handle
            .send_direct(item)
            .await
            .map_err(|_| PoolError::WorkerNotFound(worker_id))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut the pool down: close the queue, let the fleet finish what is
    /// already buffered, then terminate every worker and wait until the
    /// whole fleet has reported its exit.
    ///
    /// Idempotent. Blocked submitters wake with
    /// [`PoolError::PoolClosed`]; in-flight handler calls always run to
    /// completion.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return; // Already shut down
        }

        info!("Worker pool shutting down");

        self.work_tx.close();
        let _ = self.shutdown_tx.send(());

        let controller_handle = self.controller_handle.lock().take();
        if let Some(handle) = controller_handle {
            let _ = handle.await;
        }

        info!("Worker pool shut down");
    }
}
