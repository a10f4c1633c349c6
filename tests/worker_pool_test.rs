//! Integration tests for BoundedWorkerPool and ScheduledWorkerPool
//!
//! These tests validate:
//! - FIFO hand-back of never-started tasks on forced shutdown
//! - Graceful shutdown letting queued work finish uninterrupted
//! - Rejection after shutdown and admission limits
//! - Delayed execution and cancellation

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use workstage::config::WorkerPoolConfig;
use workstage::core::{
    interrupt, BoundedWorkerPool, Executor, PoolError, ScheduledWorkerPool, Task, ThreadFactory, WorkerPool,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn single_worker_pool() -> BoundedWorkerPool {
    workstage::util::init_tracing();
    BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(1)).expect("pool")
}

/// Block until `flag` is set or a generous bound passes.
fn wait_for(flag: &AtomicBool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(flag.load(Ordering::SeqCst), "condition not reached in time");
}

// ============================================================================
// SHUTDOWN SEMANTICS
// ============================================================================

#[test]
fn test_shutdown_now_returns_unstarted_tasks_in_order() {
    let pool = single_worker_pool();
    let started = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::new(AtomicBool::new(false));

    let (s, i) = (Arc::clone(&started), Arc::clone(&interrupted));
    pool.execute(Task::from_fn(move || {
        s.store(true, Ordering::SeqCst);
        if interrupt::sleep(Duration::from_millis(500)).is_err() {
            i.store(true, Ordering::SeqCst);
        }
    }))
    .unwrap();

    let queued: Vec<Task> = (0..3).map(|_| Task::from_fn(|| {})).collect();
    let expected: Vec<_> = queued.iter().map(Task::id).collect();
    for task in queued {
        pool.execute(task).unwrap();
    }

    wait_for(&started);
    let drained = pool.shutdown_now();
    let drained_ids: Vec<_> = drained.iter().map(Task::id).collect();
    assert_eq!(drained_ids, expected);

    assert!(pool.await_termination(Duration::from_secs(5)));
    assert!(interrupted.load(Ordering::SeqCst), "running task was not interrupted");
    assert!(pool.is_terminated());
}

#[test]
fn test_shutdown_lets_queued_work_finish() {
    let pool = single_worker_pool();
    let completed = Arc::new(AtomicUsize::new(0));
    let interrupted = Arc::new(AtomicBool::new(false));

    let (c, i) = (Arc::clone(&completed), Arc::clone(&interrupted));
    pool.execute(Task::from_fn(move || {
        if interrupt::sleep(Duration::from_millis(500)).is_err() {
            i.store(true, Ordering::SeqCst);
        }
        c.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    let c = Arc::clone(&completed);
    pool.execute(Task::from_fn(move || {
        c.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(pool.await_termination(Duration::from_secs(10)));
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert!(!interrupted.load(Ordering::SeqCst));
    assert_eq!(pool.stats().completed_tasks, 2);
}

#[test]
fn test_execute_after_shutdown_is_rejected() {
    let pool = single_worker_pool();
    pool.shutdown();
    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);
    let result = pool.submit(move || {
        r.store(true, Ordering::SeqCst);
        Ok(())
    });
    assert!(matches!(result, Err(PoolError::Rejected(_))));
    assert!(pool.await_termination(Duration::from_secs(5)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_await_termination_times_out_while_running() {
    let pool = single_worker_pool();
    pool.submit(|| {
        thread::sleep(Duration::from_millis(300));
        Ok(())
    })
    .unwrap();
    pool.shutdown();
    assert!(!pool.await_termination(Duration::from_millis(20)));
    assert!(pool.await_termination(Duration::from_secs(5)));
}

// ============================================================================
// ADMISSION AND ACCOUNTING
// ============================================================================

#[test]
fn test_queue_full_when_depth_exceeded() {
    let pool = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(1).with_max_queue_depth(2)).unwrap();
    let started = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&started);
    pool.execute(Task::from_fn(move || {
        s.store(true, Ordering::SeqCst);
        let _ = interrupt::sleep(Duration::from_secs(5));
    }))
    .unwrap();
    wait_for(&started);

    pool.submit(|| Ok(())).unwrap();
    pool.submit(|| Ok(())).unwrap();
    assert_eq!(pool.submit(|| Ok(())), Err(PoolError::QueueFull));

    assert_eq!(pool.shutdown_now().len(), 2);
    assert!(pool.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_failures_and_panics_are_counted() {
    let pool = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(2)).unwrap();
    pool.submit(|| Err(anyhow::anyhow!("tile decode failed"))).unwrap();
    pool.execute(Task::from_fn(|| panic!("bad geometry"))).unwrap();
    pool.submit(|| Ok(())).unwrap();

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)));
    let stats = pool.stats();
    assert_eq!(stats.submitted_tasks, 3);
    assert_eq!(stats.failed_tasks, 2);
    assert_eq!(stats.completed_tasks, 1);
    assert_eq!(stats.worker_count, 2);
}

#[test]
fn test_many_concurrent_submitters() {
    let pool = Arc::new(BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(4)).unwrap());
    let count = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let count = Arc::clone(&count);
            thread::spawn(move || {
                for _ in 0..250 {
                    let c = Arc::clone(&count);
                    pool.execute(Task::from_fn(move || {
                        c.fetch_add(1, Ordering::Relaxed);
                    }))
                    .unwrap();
                }
            })
        })
        .collect();
    for s in submitters {
        s.join().unwrap();
    }

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(10)));
    assert_eq!(count.load(Ordering::Relaxed), 2000);
}

struct RecordingFactory {
    names: Arc<Mutex<Vec<String>>>,
}

impl ThreadFactory for RecordingFactory {
    fn builder(&self, index: usize) -> thread::Builder {
        let name = format!("render-{index}");
        self.names.lock().push(name.clone());
        thread::Builder::new().name(name)
    }
}

#[test]
fn test_custom_thread_factory_names_workers() {
    let names = Arc::new(Mutex::new(Vec::new()));
    let pool = BoundedWorkerPool::with_thread_factory(
        WorkerPoolConfig::new().with_worker_count(2),
        RecordingFactory {
            names: Arc::clone(&names),
        },
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let s = Arc::clone(&seen);
    pool.execute(Task::from_fn(move || {
        *s.lock() = thread::current().name().map(str::to_string);
    }))
    .unwrap();
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)));

    assert_eq!(*names.lock(), vec!["render-0".to_string(), "render-1".to_string()]);
    assert!(seen.lock().as_deref().is_some_and(|n| n.starts_with("render-")));
}

#[test]
fn test_zero_workers_rejected() {
    let result = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(0));
    assert!(matches!(result, Err(PoolError::InvalidArgument(_))));
}

// ============================================================================
// SCHEDULED POOL
// ============================================================================

#[test]
fn test_scheduled_task_runs_after_delay() {
    let pool = ScheduledWorkerPool::new(WorkerPoolConfig::new().with_worker_count(1)).unwrap();
    let ran_at = Arc::new(Mutex::new(None));
    let r = Arc::clone(&ran_at);
    let scheduled_at = Instant::now();
    pool.schedule(
        Task::from_fn(move || {
            *r.lock() = Some(Instant::now());
        }),
        Duration::from_millis(50),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(300));
    let ran_at = ran_at.lock().expect("scheduled task did not run");
    assert!(ran_at.duration_since(scheduled_at) >= Duration::from_millis(50));

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_cancelled_task_never_runs() {
    let pool = ScheduledWorkerPool::new(WorkerPoolConfig::new().with_worker_count(1)).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);
    let handle = pool
        .schedule(
            Task::from_fn(move || {
                r.store(true, Ordering::SeqCst);
            }),
            Duration::from_millis(50),
        )
        .unwrap();
    assert!(handle.is_pending());
    assert!(handle.cancel());
    assert!(!handle.cancel());

    thread::sleep(Duration::from_millis(150));
    assert!(!ran.load(Ordering::SeqCst));
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_scheduled_shutdown_now_returns_delayed_tasks() {
    let pool = ScheduledWorkerPool::new(WorkerPoolConfig::new().with_worker_count(1)).unwrap();
    let delayed = Task::from_fn(|| {});
    let delayed_id = delayed.id();
    pool.schedule(delayed, Duration::from_secs(60)).unwrap();

    let drained = pool.shutdown_now();
    assert!(drained.iter().any(|t| t.id() == delayed_id));
    assert!(pool.await_termination(Duration::from_secs(5)));
    assert!(matches!(
        pool.schedule(Task::from_fn(|| {}), Duration::ZERO),
        Err(PoolError::Rejected(_))
    ));
}
