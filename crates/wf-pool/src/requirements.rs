//! Scaling policy for a worker pool.
//!
//! Requirements are normalized once at pool construction: every field at
//! or above its floor, `max_workers` never below `min_workers`. There is
//! no error path; invalid values are clamped to the library defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MIN_WORKERS: usize = 1;
const DEFAULT_MAX_WORKERS: usize = 1;
const DEFAULT_WORK_BUCKET_SIZE: usize = 10;
const DEFAULT_SPAWN_MULTIPLIER: usize = 1;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Rules for worker pool management, such as the number of workers.
///
/// Immutable after pool creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    /// Minimum number of workers the pool always maintains. Workers
    /// holding this floor never time out. Values below 1 normalize to 1.
    pub min_workers: usize,

    /// Maximum number of workers the pool may scale up to. If set below
    /// `min_workers`, normalization raises it to `min_workers`.
    pub max_workers: usize,

    /// How many work items the shared queue holds before submission
    /// starts to block.
    pub work_bucket_size: usize,

    /// How many workers to spawn per scale-up decision. Each decision is
    /// capped by the remaining headroom to `max_workers`.
    pub worker_spawn_multiplier: usize,

    /// How long a scale-up worker waits without receiving work before it
    /// retires itself.
    pub idle_timeout: Duration,
}

impl Requirements {
    /// Fix basic logical issues, such as `max_workers` being less than
    /// `min_workers`. Total: always yields a valid policy.
    pub fn normalized(mut self) -> Self {
        if self.min_workers < 1 {
            self.min_workers = DEFAULT_MIN_WORKERS;
        }

        if self.max_workers < self.min_workers {
            self.max_workers = self.min_workers;
        }

        if self.work_bucket_size < 1 {
            self.work_bucket_size = DEFAULT_WORK_BUCKET_SIZE;
        }

        if self.worker_spawn_multiplier < 1 {
            self.worker_spawn_multiplier = DEFAULT_SPAWN_MULTIPLIER;
        }

        if self.idle_timeout.is_zero() {
            self.idle_timeout = DEFAULT_IDLE_TIMEOUT;
        }

        self
    }
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            work_bucket_size: DEFAULT_WORK_BUCKET_SIZE,
            worker_spawn_multiplier: DEFAULT_SPAWN_MULTIPLIER,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
