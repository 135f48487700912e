use thiserror::Error;

use crate::worker::WorkerId;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("Pool is closed")]
    PoolClosed,
}
