//! Tokio integration.
//!
//! [`await_termination_async`] lets async code wait for any [`WorkerPool`]
//! without blocking a runtime worker, and [`TokioBlockingExecutor`] lets the
//! toolkit's wrappers run their tasks on tokio's blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::core::{Executor, PoolError, Task, WorkerPool};

/// Wait for `pool` to terminate from async code.
///
/// The condvar wait runs on tokio's blocking thread pool. Returns whether the
/// pool terminated within `timeout`.
pub async fn await_termination_async<P>(pool: Arc<P>, timeout: Duration) -> bool
where
    P: WorkerPool + ?Sized + 'static,
{
    match tokio::task::spawn_blocking(move || pool.await_termination(timeout)).await {
        Ok(terminated) => terminated,
        Err(e) => {
            warn!(error = %e, "Termination wait did not complete");
            false
        }
    }
}

/// Executor that runs each task on a tokio runtime's blocking thread pool.
///
/// Has no lifecycle of its own; the runtime owns the threads. Tasks observe
/// no interruption.
#[derive(Debug, Clone)]
pub struct TokioBlockingExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioBlockingExecutor {
    /// Executor spawning onto the given runtime.
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor spawning onto the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Internal` when called outside a tokio runtime.
    pub fn current() -> Result<Self, PoolError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| PoolError::Internal(format!("no tokio runtime: {e}")))
    }
}

impl Executor for TokioBlockingExecutor {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        self.handle.spawn_blocking(move || task.run_logged("tokio-blocking"));
        Ok(())
    }
}
