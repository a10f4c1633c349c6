//! Delayed execution on top of a bounded pool.
//!
//! A single timer thread owns a deadline heap. Requests reach it over a
//! crossbeam channel and it sleeps in `recv_deadline` until either a new
//! request arrives or the earliest entry falls due, at which point the task is
//! handed to the underlying [`BoundedWorkerPool`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::{Executor, PoolError, Task, TaskId};

use super::{BoundedWorkerPool, WorkerPool};

struct DelayedEntry {
    due: Instant,
    seq: u64,
    task_id: TaskId,
    task: Mutex<Option<Task>>,
}

/// Heap ordering: earliest due first, then submission order.
struct ByDue(Arc<DelayedEntry>);

impl PartialEq for ByDue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for ByDue {}

impl PartialOrd for ByDue {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByDue {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse to pop the earliest entry.
        (other.0.due, other.0.seq).cmp(&(self.0.due, self.0.seq))
    }
}

enum TimerCommand {
    Schedule(Arc<DelayedEntry>),
    /// Hand back every pending, uncancelled task in due order.
    Drain(Sender<Vec<Task>>),
}

/// Handle to a task scheduled with [`ScheduledWorkerPool::schedule`].
#[derive(Clone)]
pub struct ScheduledHandle {
    entry: Arc<DelayedEntry>,
}

impl ScheduledHandle {
    /// Prevent the task from running. Returns `false` if it was already handed
    /// to a worker (or cancelled before).
    pub fn cancel(&self) -> bool {
        self.entry.task.lock().take().is_some()
    }

    /// Whether the task is still waiting for its deadline.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.entry.task.lock().is_some()
    }

    /// Id of the scheduled task.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.entry.task_id
    }
}

impl std::fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("task_id", &self.entry.task_id)
            .field("due", &self.entry.due)
            .finish()
    }
}

/// Bounded worker pool with delayed, cancellable submission.
///
/// On `shutdown` tasks whose delay has not yet elapsed are discarded;
/// `shutdown_now` returns them along with the pool's queued tasks.
pub struct ScheduledWorkerPool {
    pool: Arc<BoundedWorkerPool>,
    timer_tx: Mutex<Option<Sender<TimerCommand>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
    seq: AtomicU64,
}

impl ScheduledWorkerPool {
    /// Create the underlying pool and the timer thread.
    ///
    /// # Errors
    ///
    /// Same as [`BoundedWorkerPool::new`]; `PoolError::Internal` if the timer
    /// thread cannot be spawned.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        let timer_name = format!("{}-timer", config.thread_name_prefix);
        let pool = Arc::new(BoundedWorkerPool::new(config)?);
        let (timer_tx, timer_rx) = unbounded();

        let timer_pool = Arc::clone(&pool);
        let timer = thread::Builder::new()
            .name(timer_name)
            .spawn(move || timer_loop(&timer_rx, &timer_pool))
            .map_err(|e| PoolError::Internal(format!("failed to spawn timer thread: {e}")))?;

        info!("ScheduledWorkerPool initialized");
        Ok(Self {
            pool,
            timer_tx: Mutex::new(Some(timer_tx)),
            timer: Mutex::new(Some(timer)),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        })
    }

    /// Run `task` on the pool once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Rejected` after shutdown.
    pub fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledHandle, PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::shut_down("scheduled pool"));
        }
        let entry = Arc::new(DelayedEntry {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            task_id: task.id(),
            task: Mutex::new(Some(task)),
        });

        let timer_tx = self.timer_tx.lock();
        let Some(tx) = timer_tx.as_ref() else {
            return Err(PoolError::shut_down("scheduled pool"));
        };
        tx.send(TimerCommand::Schedule(Arc::clone(&entry)))
            .map_err(|_| PoolError::shut_down("scheduled pool"))?;
        Ok(ScheduledHandle { entry })
    }

    /// The pool delayed tasks are handed to.
    #[must_use]
    pub fn pool(&self) -> &BoundedWorkerPool {
        &self.pool
    }

    fn stop_timer(&self) -> Vec<Task> {
        let Some(tx) = self.timer_tx.lock().take() else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if tx.send(TimerCommand::Drain(reply_tx)).is_err() {
            return Vec::new();
        }
        drop(tx);
        reply_rx.recv().unwrap_or_default()
    }
}

impl Executor for ScheduledWorkerPool {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::shut_down("scheduled pool"));
        }
        self.pool.execute(task)
    }
}

impl WorkerPool for ScheduledWorkerPool {
    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = self.stop_timer().len();
        if discarded > 0 {
            debug!(discarded, "Discarded delayed tasks on shutdown");
        }
        self.pool.shutdown();
    }

    fn shutdown_now(&self) -> Vec<Task> {
        self.shutdown.store(true, Ordering::Release);
        let delayed = self.stop_timer();
        let mut drained = self.pool.shutdown_now();
        drained.extend(delayed);
        drained
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.pool.is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        if !self.pool.await_termination(timeout) {
            return false;
        }
        if let Some(timer) = self.timer.lock().take() {
            if timer.join().is_err() {
                warn!("Timer thread panicked");
            }
        }
        true
    }
}

impl Drop for ScheduledWorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets the timer thread exit on its own.
        self.timer_tx.lock().take();
    }
}

fn timer_loop(rx: &Receiver<TimerCommand>, pool: &BoundedWorkerPool) {
    let mut heap: BinaryHeap<ByDue> = BinaryHeap::new();
    loop {
        let command = match heap.peek() {
            Some(next) => match rx.recv_deadline(next.0.due) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            Some(TimerCommand::Schedule(entry)) => heap.push(ByDue(entry)),
            Some(TimerCommand::Drain(reply)) => {
                let mut pending = Vec::with_capacity(heap.len());
                while let Some(ByDue(entry)) = heap.pop() {
                    if let Some(task) = entry.task.lock().take() {
                        pending.push(task);
                    }
                }
                let _ = reply.send(pending);
                break;
            }
            None => {}
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|next| next.0.due <= now) {
            let Some(ByDue(entry)) = heap.pop() else { break };
            let Some(task) = entry.task.lock().take() else {
                continue;
            };
            if let Err(e) = pool.execute(task) {
                debug!(task_id = entry.task_id, error = %e, "Delayed task rejected by pool");
            }
        }
    }
    debug!(pending = heap.len(), "Timer thread exiting");
}
