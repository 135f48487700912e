//! Worker Scaling Tests
//!
//! Tests for:
//! - Scale-up under queue pressure
//! - Spawn batches capped at remaining capacity (ceiling never exceeded)
//! - Idle retirement back down to the floor
//! - Idle-timeout exemptions (the floor, unbounded timeouts)
//! - Burst behavior end to end

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use wf_pool::{Requirements, WorkHandler, WorkerContext, WorkerPool};

/// Mock handler that counts invocations and holds each one for a fixed delay
struct CountingHandler {
    call_count: AtomicU32,
    delay_ms: u64,
}

impl CountingHandler {
    fn with_delay(delay_ms: u64) -> Self {
        Self {
            call_count: AtomicU32::new(0),
            delay_ms,
        }
    }

    fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkHandler<String> for CountingHandler {
    async fn handle(&self, _ctx: &WorkerContext, _item: String) {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

/// Poll `condition` until it holds or `deadline` elapses.
async fn wait_for(condition: impl Fn() -> bool, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Route pool logs to the test writer; filter with `RUST_LOG` as usual.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_scales_up_under_queue_pressure() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 1,
        max_workers: 4,
        work_bucket_size: 100,
        worker_spawn_multiplier: 1,
        idle_timeout: Duration::from_millis(200),
    });
    let handler = Arc::new(CountingHandler::with_delay(50));
    assert!(pool.set_work_handler(handler.clone()));

    for i in 0..20 {
        pool.submit(format!("item-{}", i)).await.unwrap();
    }

    // Pressure holds while the backlog drains, so the fleet grows to max.
    assert!(wait_for(|| pool.active_worker_count() == 4, Duration::from_secs(2)).await);
    assert!(wait_for(|| handler.call_count() == 20, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_never_exceeds_max_workers() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 1,
        max_workers: 3,
        work_bucket_size: 50,
        worker_spawn_multiplier: 25,
        idle_timeout: Duration::from_millis(100),
    });
    let handler = Arc::new(CountingHandler::with_delay(20));
    assert!(pool.set_work_handler(handler.clone()));

    for i in 0..40 {
        pool.submit(format!("item-{}", i)).await.unwrap();
    }

    // The multiplier far exceeds the headroom; sample the live count
    // through the whole burst and verify the ceiling holds.
    let mut max_seen = 0;
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_millis(500) {
        max_seen = max_seen.max(pool.active_worker_count());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(max_seen, 3, "ceiling should be reached but never exceeded");
}

#[tokio::test]
async fn test_returns_to_min_after_idle() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 1,
        max_workers: 5,
        work_bucket_size: 100,
        worker_spawn_multiplier: 2,
        idle_timeout: Duration::from_millis(100),
    });
    let handler = Arc::new(CountingHandler::with_delay(10));
    assert!(pool.set_work_handler(handler.clone()));

    for i in 0..30 {
        pool.submit(format!("item-{}", i)).await.unwrap();
    }

    assert!(wait_for(|| pool.active_worker_count() > 1, Duration::from_secs(2)).await);
    assert!(wait_for(|| handler.call_count() == 30, Duration::from_secs(5)).await);

    // Scale-up workers retire one idle timeout after their last item.
    assert!(wait_for(|| pool.active_worker_count() == 1, Duration::from_secs(3)).await);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(pool.active_worker_count(), 1);
}

#[tokio::test]
async fn test_floor_workers_never_time_out() {
    init_tracing();

    let pool: WorkerPool<String> = WorkerPool::new(Requirements {
        min_workers: 2,
        max_workers: 4,
        work_bucket_size: 10,
        worker_spawn_multiplier: 1,
        idle_timeout: Duration::from_millis(50),
    });

    // No work at all for many multiples of the idle timeout.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pool.active_worker_count(), 2);
}

#[tokio::test]
async fn test_unbounded_idle_timeout_never_retires_workers() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 1,
        max_workers: 2,
        work_bucket_size: 20,
        worker_spawn_multiplier: 1,
        idle_timeout: Duration::MAX,
    });
    let handler = Arc::new(CountingHandler::with_delay(20));
    assert!(pool.set_work_handler(handler.clone()));

    for i in 0..10 {
        pool.submit(format!("item-{}", i)).await.unwrap();
    }

    // Backlog pressure brings in a scale-up worker that runs under the
    // unbounded timeout and rearms it after every item.
    assert!(wait_for(|| pool.active_worker_count() == 2, Duration::from_secs(2)).await);
    assert!(wait_for(|| handler.call_count() == 10, Duration::from_secs(5)).await);

    // The scale-up worker survived its rearm and still takes direct work.
    pool.direct_work(2, "direct".to_string()).await.unwrap();
    assert!(wait_for(|| handler.call_count() == 11, Duration::from_secs(2)).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pool.active_worker_count(), 2);
}

#[tokio::test]
async fn test_no_scale_up_below_pressure_threshold() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 3,
        max_workers: 6,
        work_bucket_size: 10,
        worker_spawn_multiplier: 2,
        idle_timeout: Duration::from_millis(200),
    });
    let handler = Arc::new(CountingHandler::with_delay(100));
    assert!(pool.set_work_handler(handler.clone()));

    // Trickled work never builds a backlog deeper than min_workers, so
    // the controller leaves the fleet at the floor.
    for i in 0..5 {
        pool.submit(format!("item-{}", i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.active_worker_count(), 3);
    }

    assert!(wait_for(|| handler.call_count() == 5, Duration::from_secs(2)).await);
    assert_eq!(pool.active_worker_count(), 3);
}

#[tokio::test]
async fn test_burst_scales_to_ceiling_and_back() {
    init_tracing();

    let pool = WorkerPool::new(Requirements {
        min_workers: 1,
        max_workers: 25,
        work_bucket_size: 500,
        worker_spawn_multiplier: 25,
        idle_timeout: Duration::from_millis(50),
    });
    let handler = Arc::new(CountingHandler::with_delay(25));
    assert!(pool.set_work_handler(handler.clone()));

    for i in 0..100 {
        pool.submit(format!("item-{}", i)).await.unwrap();
    }

    // One spawn batch takes the fleet straight to the ceiling.
    assert!(wait_for(|| pool.active_worker_count() == 25, Duration::from_secs(2)).await);

    assert!(wait_for(|| handler.call_count() == 100, Duration::from_secs(5)).await);

    // After the burst, everything above the floor retires.
    assert!(wait_for(|| pool.active_worker_count() == 1, Duration::from_secs(5)).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.active_worker_count(), 1);
}
