//! Synchronous execution on the caller's thread.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::{Executor, PoolError, Task, WorkerPool};

/// Runs every task immediately on the thread that calls `execute`.
///
/// A failing task is reported to the caller as `PoolError::TaskFailed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        task.run().map_err(|e| PoolError::TaskFailed(format!("{e:#}")))
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    shutdown: bool,
    in_flight: usize,
}

/// [`InlineExecutor`] with a service lifecycle.
///
/// Several threads may be inside `execute` at once; the service counts them
/// and only reports termination once the last one has returned.
#[derive(Debug, Default)]
pub struct InlineService {
    state: Mutex<ServiceState>,
    idle: Condvar,
}

/// Decrements the in-flight count even if the task unwinds.
struct InFlight<'a>(&'a InlineService);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl InlineService {
    /// A running service with no calls in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `execute` calls currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}

impl Executor for InlineService {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return Err(PoolError::shut_down("inline service"));
            }
            state.in_flight += 1;
        }
        let _guard = InFlight(self);
        InlineExecutor.execute(task)
    }
}

impl WorkerPool for InlineService {
    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!(in_flight = state.in_flight, "Inline service shut down");
        }
        self.idle.notify_all();
    }

    fn shutdown_now(&self) -> Vec<Task> {
        // Nothing is ever queued, so there is nothing to hand back.
        self.shutdown();
        Vec::new()
    }

    fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    fn is_terminated(&self) -> bool {
        let state = self.state.lock();
        state.shutdown && state.in_flight == 0
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !(state.shutdown && state.in_flight == 0) {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.shutdown && state.in_flight == 0;
            }
        }
        true
    }
}
