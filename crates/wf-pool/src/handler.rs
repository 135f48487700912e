//! Work handler - the processing seam between the pool and its caller.
//!
//! The pool invokes one handler for every work item, whether the item
//! arrived through the shared queue or by direct dispatch. The handler is
//! installed once via [`WorkerPool::set_work_handler`] and shared by all
//! workers; items consumed before a handler is installed are discarded by
//! the no-op default.
//!
//! [`WorkerPool::set_work_handler`]: crate::pool::WorkerPool::set_work_handler

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::worker::WorkerContext;

/// Trait for processing work items.
///
/// `ctx` identifies the worker running the item and lets the handler
/// retire it (`ctx.terminate()`).
#[async_trait]
pub trait WorkHandler<T>: Send + Sync {
    async fn handle(&self, ctx: &WorkerContext, item: T);
}

/// The pool-wide handler slot. Set at most once; workers read it per item,
/// so a handler installed after a worker was spawned still applies to
/// everything that worker processes from then on.
pub(crate) type SharedHandler<T> = Arc<RwLock<Option<Arc<dyn WorkHandler<T>>>>>;

/// Adapter turning an async closure into a [`WorkHandler`].
///
/// The context is passed by value (it is a cheap clone) so the returned
/// future does not borrow from the closure arguments.
pub struct FnWorkHandler<F> {
    func: F,
}

impl<F> FnWorkHandler<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<T, F, Fut> WorkHandler<T> for FnWorkHandler<F>
where
    T: Send + 'static,
    F: Fn(WorkerContext, T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: &WorkerContext, item: T) {
        (self.func)(ctx.clone(), item).await
    }
}
