//! Per-task execution deadlines enforced by a watchdog thread.
//!
//! Each submission is wrapped so that, when a worker starts it, the worker's
//! [`Interrupter`] is registered and a deadline is armed with the watchdog.
//! When the deadline passes while the task is still running, the watchdog
//! interrupts that thread once. Deadlines are never re-armed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::TimeboundConfig;

use super::interrupt::{self, Interrupter};
use super::{Executor, PoolError, Task, TaskId, WorkerPool};

enum WatchdogCommand {
    Arm(Instant, u64),
    /// Wrapped tasks hold senders too, so exit is requested explicitly.
    Stop,
}

struct Watched {
    task_id: TaskId,
    interrupter: Interrupter,
    fired: AtomicBool,
}

#[derive(Default)]
struct Watchdog {
    running: Mutex<HashMap<u64, Arc<Watched>>>,
    firings: AtomicU64,
}

impl Watchdog {
    fn fire(&self, submission: u64) {
        let running = self.running.lock();
        let Some(watched) = running.get(&submission) else {
            return;
        };
        if !watched.fired.swap(true, Ordering::AcqRel) {
            watched.interrupter.interrupt();
            self.firings.fetch_add(1, Ordering::Relaxed);
            debug!(task_id = watched.task_id, "Task exceeded its time limit; interrupted");
        }
    }

    fn interrupt_all(&self) -> usize {
        let running = self.running.lock();
        for watched in running.values() {
            watched.interrupter.interrupt();
        }
        running.len()
    }
}

/// Executor that interrupts tasks running longer than a fixed time limit.
///
/// Lifecycle calls are forwarded to the wrapped pool, which this executor is
/// expected to own.
pub struct TimeboundExecutor<P: WorkerPool + ?Sized + 'static = dyn WorkerPool> {
    target: Arc<P>,
    time_limit: Duration,
    shutdown: AtomicBool,
    submissions: AtomicU64,
    watchdog: Arc<Watchdog>,
    arm_tx: Mutex<Option<Sender<WatchdogCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<P: WorkerPool + ?Sized + 'static> TimeboundExecutor<P> {
    /// Wrap `target`, interrupting tasks that run longer than `time_limit_ms`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for a zero limit and
    /// `PoolError::Internal` if the watchdog thread cannot be spawned.
    pub fn new(target: Arc<P>, time_limit_ms: u64) -> Result<Self, PoolError> {
        Self::from_config(target, &TimeboundConfig { time_limit_ms })
    }

    /// Build from a configuration section.
    ///
    /// # Errors
    ///
    /// Same as [`TimeboundExecutor::new`].
    pub fn from_config(target: Arc<P>, config: &TimeboundConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidArgument)?;

        let watchdog = Arc::new(Watchdog::default());
        let (arm_tx, arm_rx) = unbounded();
        let thread_watchdog = Arc::clone(&watchdog);
        let thread = thread::Builder::new()
            .name("workstage-watchdog".into())
            .spawn(move || watchdog_loop(&arm_rx, &thread_watchdog))
            .map_err(|e| PoolError::Internal(format!("failed to spawn watchdog thread: {e}")))?;

        info!(time_limit_ms = config.time_limit_ms, "TimeboundExecutor initialized");
        Ok(Self {
            target,
            time_limit: Duration::from_millis(config.time_limit_ms),
            shutdown: AtomicBool::new(false),
            submissions: AtomicU64::new(0),
            watchdog,
            arm_tx: Mutex::new(Some(arm_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Number of deadline interruptions sent so far.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.watchdog.firings.load(Ordering::Relaxed)
    }

    /// The configured limit.
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        self.time_limit
    }

    fn stop_watchdog(&self) {
        if let Some(tx) = self.arm_tx.lock().take() {
            let _ = tx.send(WatchdogCommand::Stop);
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
    }
}

impl<P: WorkerPool + ?Sized + 'static> Executor for TimeboundExecutor<P> {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::shut_down("timebound executor"));
        }
        let Some(arm_tx) = self.arm_tx.lock().clone() else {
            return Err(PoolError::shut_down("timebound executor"));
        };

        let submission = self.submissions.fetch_add(1, Ordering::Relaxed);
        let watchdog = Arc::clone(&self.watchdog);
        let limit = self.time_limit;
        let wrapped = task.wrap(move |task| {
            let watched = Arc::new(Watched {
                task_id: task.id(),
                interrupter: interrupt::current(),
                fired: AtomicBool::new(false),
            });
            watchdog.running.lock().insert(submission, Arc::clone(&watched));
            // The watchdog may already be gone after shutdown_now; the task
            // then simply runs unwatched.
            let _ = arm_tx.send(WatchdogCommand::Arm(Instant::now() + limit, submission));

            let outcome = task.run();

            watchdog.running.lock().remove(&submission);
            if watched.fired.load(Ordering::Acquire) {
                // Do not leak an unobserved deadline signal into the next task.
                watched.interrupter.clear();
            }
            outcome
        });
        self.target.execute(wrapped)
    }
}

impl<P: WorkerPool + ?Sized + 'static> WorkerPool for TimeboundExecutor<P> {
    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.target.shutdown();
    }

    fn shutdown_now(&self) -> Vec<Task> {
        self.shutdown.store(true, Ordering::Release);
        let interrupted = self.watchdog.interrupt_all();
        debug!(interrupted, "TimeboundExecutor stopped");
        self.target.shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.target.is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        if !self.target.await_termination(timeout) {
            return false;
        }
        self.stop_watchdog();
        true
    }
}

impl<P: WorkerPool + ?Sized + 'static> Drop for TimeboundExecutor<P> {
    fn drop(&mut self) {
        if let Some(tx) = self.arm_tx.lock().take() {
            let _ = tx.send(WatchdogCommand::Stop);
        }
    }
}

fn watchdog_loop(rx: &Receiver<WatchdogCommand>, watchdog: &Watchdog) {
    let mut deadlines: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    loop {
        let command = match deadlines.peek() {
            Some(Reverse((due, _))) => match rx.recv_deadline(*due) {
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
            Some(WatchdogCommand::Arm(due, submission)) => deadlines.push(Reverse((due, submission))),
            Some(WatchdogCommand::Stop) => break,
            None => {}
        }

        let now = Instant::now();
        while let Some(&Reverse((due, submission))) = deadlines.peek() {
            if due > now {
                break;
            }
            deadlines.pop();
            watchdog.fire(submission);
        }
    }
    debug!("Watchdog thread exiting");
}
