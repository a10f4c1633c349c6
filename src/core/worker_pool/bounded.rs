//! Fixed-size pool of dedicated OS threads.
//!
//! # Design
//!
//! - **Short hand-off**: submissions push onto a `VecDeque` under one brief
//!   `parking_lot::Mutex` hold; a worker is only signalled when one is parked.
//! - **No polling**: idle workers park on a `Condvar`; termination waiters park
//!   on a second one.
//! - **Explicit accounting**: the pool owns every worker's join handle and
//!   interrupter, so `shutdown_now` can interrupt exactly its own threads.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::config::WorkerPoolConfig;
use crate::core::interrupt::{self, Interrupter};
use crate::core::{Executor, PoolError, Task};

use super::{NamedThreadFactory, PoolCounters, PoolStats, ThreadFactory, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    /// `shutdown`: drain the queue, then exit.
    Draining,
    /// `shutdown_now`: exit without taking further tasks.
    Stopped,
}

struct QueueState {
    queue: VecDeque<Task>,
    run_state: RunState,
    idle_workers: usize,
    live_workers: usize,
}

struct Shared {
    name: String,
    max_queue_depth: Option<usize>,
    state: Mutex<QueueState>,
    /// Signalled when a task is queued or the run state changes.
    work_ready: Condvar,
    /// Signalled when the last worker exits.
    terminated: Condvar,
    counters: PoolCounters,
    interrupters: Mutex<Vec<Interrupter>>,
}

/// Worker pool with a fixed number of dedicated OS threads.
///
/// Tasks are admitted in FIFO order; once dispatched to different workers
/// they run concurrently with no ordering between them.
pub struct BoundedWorkerPool {
    shared: Arc<Shared>,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedWorkerPool {
    /// Create a pool whose threads are named after `config.thread_name_prefix`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` if the configuration is invalid and
    /// `PoolError::Internal` if a worker thread cannot be spawned.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        let mut factory = NamedThreadFactory::new(config.thread_name_prefix.clone());
        if let Some(bytes) = config.thread_stack_size {
            factory = factory.with_stack_size(bytes);
        }
        Self::with_thread_factory(config, factory)
    }

    /// Create a pool whose threads come from `factory`.
    ///
    /// # Errors
    ///
    /// Same as [`BoundedWorkerPool::new`].
    pub fn with_thread_factory<F>(config: WorkerPoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: ThreadFactory,
    {
        config.validate().map_err(PoolError::InvalidArgument)?;

        let shared = Arc::new(Shared {
            name: config.thread_name_prefix.clone(),
            max_queue_depth: config.max_queue_depth,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                run_state: RunState::Running,
                idle_workers: 0,
                live_workers: config.worker_count,
            }),
            work_ready: Condvar::new(),
            terminated: Condvar::new(),
            counters: PoolCounters::default(),
            interrupters: Mutex::new(Vec::with_capacity(config.worker_count)),
        });

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = factory
                .builder(worker_id)
                .spawn(move || worker_loop(worker_id, &worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Workers that never started must not hold up termination.
                    let mut state = shared.state.lock();
                    state.live_workers -= config.worker_count - worker_id;
                    state.run_state = RunState::Stopped;
                    drop(state);
                    shared.work_ready.notify_all();
                    return Err(PoolError::Internal(format!("failed to spawn worker thread: {e}")));
                }
            }
        }

        info!(
            pool = %config.thread_name_prefix,
            worker_count = config.worker_count,
            max_queue_depth = ?config.max_queue_depth,
            "BoundedWorkerPool initialized"
        );

        Ok(Self {
            shared,
            worker_count: config.worker_count,
            workers: Mutex::new(workers),
        })
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(self.worker_count)
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn join_workers(&self) {
        for (idx, worker) in self.workers.lock().drain(..).enumerate() {
            if worker.join().is_err() {
                warn!(pool = %self.shared.name, worker_id = idx, "Worker panicked");
            }
        }
    }
}

impl Executor for BoundedWorkerPool {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        let task_id = task.id();
        let mut state = self.shared.state.lock();
        if state.run_state != RunState::Running {
            return Err(PoolError::shut_down("worker pool"));
        }
        if self
            .shared
            .max_queue_depth
            .is_some_and(|max| state.queue.len() >= max)
        {
            warn!(pool = %self.shared.name, "Worker pool queue is full");
            return Err(PoolError::QueueFull);
        }
        state.queue.push_back(task);
        // Counted under the lock so a worker's decrement after the pop can
        // never run first.
        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.shared.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        let wake = state.idle_workers > 0;
        drop(state);

        if wake {
            self.shared.work_ready.notify_one();
        }
        trace!(pool = %self.shared.name, task_id, "Task submitted to worker pool");
        Ok(())
    }
}

impl WorkerPool for BoundedWorkerPool {
    fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.run_state != RunState::Running {
            return;
        }
        state.run_state = RunState::Draining;
        let queued = state.queue.len();
        drop(state);

        self.shared.work_ready.notify_all();
        info!(pool = %self.shared.name, queued, "Shutting down worker pool");
    }

    fn shutdown_now(&self) -> Vec<Task> {
        let mut state = self.shared.state.lock();
        state.run_state = RunState::Stopped;
        let drained: Vec<Task> = state.queue.drain(..).collect();
        drop(state);

        self.shared
            .counters
            .queued_tasks
            .fetch_sub(drained.len() as u64, Ordering::Relaxed);
        self.shared.work_ready.notify_all();
        for interrupter in self.shared.interrupters.lock().iter() {
            interrupter.interrupt();
        }
        info!(
            pool = %self.shared.name,
            drained = drained.len(),
            "Worker pool stopped; running tasks interrupted"
        );
        drained
    }

    fn is_shutdown(&self) -> bool {
        self.shared.state.lock().run_state != RunState::Running
    }

    fn is_terminated(&self) -> bool {
        let state = self.shared.state.lock();
        state.run_state != RunState::Running && state.live_workers == 0
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.run_state == RunState::Running || state.live_workers > 0 {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.run_state != RunState::Running && state.live_workers == 0;
            }
        }
        drop(state);

        self.join_workers();
        debug!(pool = %self.shared.name, "Worker pool terminated");
        true
    }
}

impl Drop for BoundedWorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join: a dropped pool must not block on
        // long-running tasks.
        let mut state = self.shared.state.lock();
        if state.run_state == RunState::Running {
            state.run_state = RunState::Draining;
            drop(state);
            self.shared.work_ready.notify_all();
            debug!(pool = %self.shared.name, "BoundedWorkerPool dropped without explicit shutdown");
        }
    }
}

fn next_task(shared: &Shared) -> Option<Task> {
    let mut state = shared.state.lock();
    loop {
        match state.run_state {
            RunState::Stopped => return None,
            RunState::Draining if state.queue.is_empty() => return None,
            _ => {}
        }
        if let Some(task) = state.queue.pop_front() {
            return Some(task);
        }
        state.idle_workers += 1;
        shared.work_ready.wait(&mut state);
        state.idle_workers -= 1;
    }
}

fn worker_loop(worker_id: usize, shared: &Shared) {
    let me = interrupt::current();
    shared.interrupters.lock().push(me.clone());
    debug!(pool = %shared.name, worker_id, "Worker thread started");

    while let Some(task) = next_task(shared) {
        // A stale interrupt belongs to the previous task; one raised by
        // shutdown_now after the pop must survive.
        me.clear();
        if shared.state.lock().run_state == RunState::Stopped {
            me.interrupt();
        }

        shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);

        let task_id = task.id();
        trace!(pool = %shared.name, worker_id, task_id, "Worker executing task");
        let ok = task.run_logged(&shared.name);

        shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        if ok {
            shared.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
        }
    }

    let mut state = shared.state.lock();
    state.live_workers -= 1;
    if state.live_workers == 0 {
        shared.terminated.notify_all();
    }
    drop(state);
    debug!(pool = %shared.name, worker_id, "Worker thread exiting");
}
