//! Workforce Worker Pool
//!
//! This crate provides a self-scaling pool of async workers with:
//! - WorkerPool: Public facade for submission, direct dispatch and shutdown
//! - Requirements: Sizing and timeout parameters, normalized instead of rejected
//! - WorkHandler / FnWorkHandler: One-time-settable work callback (trait or closure)
//! - WorkerContext: Per-invocation view of the executing worker (id, self-terminate)
//! - Controller: Background task that scales up under queue pressure and
//!   evicts workers that timed out or were terminated
//!
//! Workers compete over one shared bounded queue; scale-up workers retire
//! after an idle timeout while the `min_workers` floor lives until shutdown.

mod controller;

pub mod error;
pub mod handler;
pub mod pool;
pub mod requirements;
pub mod worker;

pub use error::PoolError;
pub use handler::{FnWorkHandler, WorkHandler};
pub use pool::{PoolStats, WorkerPool};
pub use requirements::Requirements;
pub use worker::{WorkerContext, WorkerId};

pub type Result<T> = std::result::Result<T, PoolError>;
