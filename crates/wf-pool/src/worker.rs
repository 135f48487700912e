//! Worker - a single concurrent execution unit of the pool.
//!
//! Each worker runs as its own Tokio task and waits on three sources at
//! once: its private direct-dispatch inbox, the shared work queue, and its
//! idle timer. Work from either channel runs the handler, then rearms the
//! timer. A fired timer or an explicit terminate moves the worker to
//! Draining: the inbox is closed and drained to its end, no new
//! shared-queue work is claimed, and the worker reports its own id to the
//! controller's eviction sink exactly once before the task exits.
//!
//! Lifecycle state advances only inside the worker's own loop, through an
//! atomic compare-and-swap. A timer firing concurrently with work arrival
//! therefore cannot produce a second termination: the loop observes one
//! signal at a time and a failed transition is a no-op.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use crate::handler::SharedHandler;

/// Identifier a pool assigns to a worker. Monotonic within the pool,
/// starting at 1, never reused.
pub type WorkerId = u64;

/// Capacity of each worker's private direct-dispatch inbox. Dispatching
/// to a full inbox blocks the caller.
const DIRECT_INBOX_CAPACITY: usize = 8;

/// Stand-in duration for workers that never time out. Their idle arm is
/// disabled, so the timer is never observed firing.
const UNBOUNDED_IDLE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Linear worker lifecycle: no transition ever runs backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WorkerState {
    Active = 0,
    Draining = 1,
    Terminated = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Active,
            1 => WorkerState::Draining,
            _ => WorkerState::Terminated,
        }
    }
}

/// Shared lifecycle record for one worker: the state slot plus the
/// take-once sender that delivers the terminate signal.
pub(crate) struct Lifecycle {
    state: AtomicU8,
    drain_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Lifecycle {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<()>) {
        let (drain_tx, drain_rx) = oneshot::channel();
        let lifecycle = Arc::new(Self {
            state: AtomicU8::new(WorkerState::Active as u8),
            drain_tx: Mutex::new(Some(drain_tx)),
        });
        (lifecycle, drain_rx)
    }

    /// Deliver the terminate signal. Idempotent: only the first call
    /// sends, every later call is a no-op returning `false`.
    pub(crate) fn request_drain(&self) -> bool {
        match self.drain_tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Advance `from -> to`, failing (and changing nothing) if the state
    /// already moved on.
    pub(crate) fn advance(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Worker identity handed to the handler with every item.
///
/// Cheap to clone; lets handler code read the processing worker's id and
/// retire the worker it runs on.
#[derive(Clone)]
pub struct WorkerContext {
    id: WorkerId,
    lifecycle: Arc<Lifecycle>,
}

impl WorkerContext {
    pub(crate) fn new(id: WorkerId, lifecycle: Arc<Lifecycle>) -> Self {
        Self { id, lifecycle }
    }

    /// The immutable identifier of the worker processing this item.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Ask this worker to drain and exit. Safe to call repeatedly; the
    /// worker finishes the current item first.
    pub fn terminate(&self) {
        self.lifecycle.request_drain();
    }
}

/// Non-owning reference to a live worker, stored in the registry.
pub(crate) struct WorkerHandle<T> {
    id: WorkerId,
    inbox_tx: mpsc::Sender<T>,
    lifecycle: Arc<Lifecycle>,
}

// Manual impl: `T` itself does not need to be `Clone` for the handle to be.
impl<T> Clone for WorkerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inbox_tx: self.inbox_tx.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<T> WorkerHandle<T> {
    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn terminate(&self) {
        self.lifecycle.request_drain();
    }

    /// Deliver an item to the worker's private inbox, waiting while the
    /// inbox is full. Fails if the worker already left the Active state
    /// or closed its inbox; the item is handed back in the error.
    pub(crate) async fn send_direct(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        if self.lifecycle.state() != WorkerState::Active {
            return Err(mpsc::error::SendError(item));
        }

        self.inbox_tx.send(item).await
    }
}

/// The execution unit itself. Owned by its spawned task; the registry
/// only ever holds the matching [`WorkerHandle`].
pub(crate) struct Worker<T> {
    id: WorkerId,
    inbox_rx: mpsc::Receiver<T>,
    shared_rx: async_channel::Receiver<T>,
    handler: SharedHandler<T>,
    /// `None` for workers holding the minimum floor; they never retire.
    idle_timeout: Option<Duration>,
    lifecycle: Arc<Lifecycle>,
    drain_rx: oneshot::Receiver<()>,
    evict_tx: mpsc::Sender<WorkerId>,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn new(
        id: WorkerId,
        shared_rx: async_channel::Receiver<T>,
        handler: SharedHandler<T>,
        idle_timeout: Option<Duration>,
        evict_tx: mpsc::Sender<WorkerId>,
    ) -> (Self, WorkerHandle<T>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(DIRECT_INBOX_CAPACITY);
        let (lifecycle, drain_rx) = Lifecycle::new();

        let handle = WorkerHandle {
            id,
            inbox_tx,
            lifecycle: Arc::clone(&lifecycle),
        };

        let worker = Self {
            id,
            inbox_rx,
            shared_rx,
            handler,
            idle_timeout,
            lifecycle,
            drain_rx,
            evict_tx,
        };

        (worker, handle)
    }

    pub(crate) async fn run(mut self) {
        debug!(worker_id = self.id, "Worker started");

        let ctx = WorkerContext::new(self.id, Arc::clone(&self.lifecycle));

        let idle = tokio::time::sleep(self.idle_timeout.unwrap_or(UNBOUNDED_IDLE));
        tokio::pin!(idle);

        loop {
            let item = tokio::select! {
                // Explicit terminate. An error here means the lifecycle
                // record vanished, which the worker treats the same way.
                _ = &mut self.drain_rx => {
                    debug!(worker_id = self.id, "Worker terminate requested");
                    break;
                }
                maybe = self.inbox_rx.recv() => match maybe {
                    Some(item) => item,
                    // All handles dropped; nothing can reach this worker.
                    None => break,
                },
                received = self.shared_rx.recv() => match received {
                    Ok(item) => item,
                    // Queue closed and fully drained: pool shutdown.
                    Err(_) => break,
                },
                _ = &mut idle, if self.idle_timeout.is_some() => {
                    debug!(worker_id = self.id, "Worker idle timeout, retiring");
                    break;
                }
            };

            self.process(&ctx, item).await;

            if let Some(timeout) = self.idle_timeout {
                // An over-large timeout (`Duration::MAX` reads as never)
                // saturates instead of overflowing the deadline.
                let deadline = Instant::now()
                    .checked_add(timeout)
                    .unwrap_or_else(|| Instant::now() + UNBOUNDED_IDLE);
                idle.as_mut().reset(deadline);
            }
        }

        self.lifecycle.advance(WorkerState::Active, WorkerState::Draining);

        // Close the inbox, then drain it to the end: direct work that won
        // the delivery race is still processed, late senders get their
        // item handed back. New shared-queue items are left for others.
        self.inbox_rx.close();
        while let Some(item) = self.inbox_rx.recv().await {
            self.process(&ctx, item).await;
        }

        self.lifecycle.advance(WorkerState::Draining, WorkerState::Terminated);

        let _ = self.evict_tx.send(self.id).await;
        debug!(worker_id = self.id, "Worker exited");
    }

    /// Run the installed handler for one item. The slot is read per item;
    /// with no handler installed yet the item is consumed and discarded.
    async fn process(&self, ctx: &WorkerContext, item: T) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler.handle(ctx, item).await,
            None => debug!(worker_id = self.id, "No work handler installed, discarding item"),
        }
    }
}
