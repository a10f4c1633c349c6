//! Worker pool abstraction and the thread-backed implementations.
//!
//! `WorkerPool` extends [`Executor`] with the service lifecycle:
//! graceful `shutdown`, forced `shutdown_now` and `await_termination`.
//! Two implementations live here:
//!
//! - [`BoundedWorkerPool`]: a fixed number of dedicated OS threads pulling from a
//!   FIFO admission queue.
//! - [`ScheduledWorkerPool`]: a bounded pool fronted by a timer thread, for
//!   delayed and cancellable execution.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use workstage::config::WorkerPoolConfig;
//! use workstage::core::{BoundedWorkerPool, Executor, WorkerPool};
//!
//! let pool = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(2))?;
//! pool.submit(|| Ok(()))?;
//! pool.shutdown();
//! assert!(pool.await_termination(Duration::from_secs(5)));
//! # Ok::<(), workstage::core::PoolError>(())
//! ```

mod bounded;
mod scheduled;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{Executor, Task};

pub use bounded::BoundedWorkerPool;
pub use scheduled::{ScheduledHandle, ScheduledWorkerPool};

/// An executor with a service lifecycle.
pub trait WorkerPool: Executor {
    /// Stop accepting work. Queued and running tasks still run to completion
    /// and nothing is interrupted.
    fn shutdown(&self);

    /// Stop accepting work, interrupt running tasks and return the tasks that
    /// never started, in submission order.
    fn shutdown_now(&self) -> Vec<Task>;

    /// Whether `shutdown` or `shutdown_now` has been called.
    fn is_shutdown(&self) -> bool;

    /// Whether the pool is shut down and all work has finished.
    fn is_terminated(&self) -> bool;

    /// Block until the pool terminates or `timeout` elapses. Returns whether
    /// termination completed.
    fn await_termination(&self, timeout: Duration) -> bool;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn shutdown(&self) {
        (**self).shutdown();
    }

    fn shutdown_now(&self) -> Vec<Task> {
        (**self).shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        (**self).await_termination(timeout)
    }
}

/// Supplies the thread builder for each worker a pool spawns.
pub trait ThreadFactory: Send + Sync + 'static {
    /// Builder for the worker with the given index.
    fn builder(&self, index: usize) -> thread::Builder;
}

/// Names threads `<prefix>-<index>` and optionally sets their stack size.
#[derive(Debug, Clone)]
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
}

impl NamedThreadFactory {
    /// Factory with the given thread name prefix and the platform stack size.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
        }
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn builder(&self, index: usize) -> thread::Builder {
        let builder = thread::Builder::new().name(format!("{}-{index}", self.prefix));
        match self.stack_size {
            Some(bytes) => builder.stack_size(bytes),
            None => builder,
        }
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Currently executing tasks.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks that returned `Ok`.
    pub completed_tasks: u64,
    /// Tasks that returned an error or panicked.
    pub failed_tasks: u64,
    /// Tasks accepted by `execute`.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}
