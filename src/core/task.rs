//! Units of work and the executor seam every component implements.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, warn};

use super::PoolError;

/// Process-unique task identifier, assigned in submission order.
pub type TaskId = u64;

/// Outcome of running a task body.
pub type TaskResult = anyhow::Result<()>;

type Job = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A zero-argument unit of work with no return value, possibly failing.
///
/// Tasks carry an id so that work handed back by `shutdown_now` can be matched
/// against what was submitted.
pub struct Task {
    id: TaskId,
    job: Job,
}

impl Task {
    /// Wrap a fallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self::with_id(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed), f)
    }

    /// Wrap a closure that cannot fail.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            f();
            Ok(())
        })
    }

    pub(crate) fn with_id<F>(id: TaskId, f: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self { id, job: Box::new(f) }
    }

    /// Identifier assigned when the task was created.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Replace the body with `wrap(original)` while keeping the same id.
    pub(crate) fn wrap<F>(self, wrap: F) -> Self
    where
        F: FnOnce(Self) -> TaskResult + Send + 'static,
    {
        let id = self.id;
        Self::with_id(id, move || wrap(self))
    }

    /// Run the task on the calling thread. A panic inside the body is caught
    /// and reported as an error.
    pub fn run(self) -> TaskResult {
        let id = self.id;
        self.catch_panic()
            .unwrap_or_else(|message| Err(anyhow!("task {id} panicked: {message}")))
    }

    fn catch_panic(self) -> Result<TaskResult, String> {
        panic::catch_unwind(AssertUnwindSafe(self.job)).map_err(|payload| panic_message(&*payload))
    }

    /// Run the task and log a failure through the owning component's normal
    /// failure path. Returns whether the task succeeded.
    pub(crate) fn run_logged(self, component: &str) -> bool {
        let id = self.id;
        match self.catch_panic() {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(component, task_id = id, error = %err, "Task failed");
                false
            }
            Err(message) => {
                error!(component, task_id = id, panic = %message, "Task panicked");
                false
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Anything that accepts tasks for execution.
///
/// This is the narrow seam shared by pools and by wrappers that have no
/// lifecycle of their own (sequential queue, debouncer, inline executor).
pub trait Executor: Send + Sync {
    /// Accept a task for execution.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Rejected` once the component stops accepting work,
    /// or another variant specific to the component.
    fn execute(&self, task: Task) -> Result<(), PoolError>;

    /// Wrap `f` into a [`Task`], execute it and return its id.
    ///
    /// # Errors
    ///
    /// Same as [`Executor::execute`].
    fn submit<F>(&self, f: F) -> Result<TaskId, PoolError>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
        Self: Sized,
    {
        let task = Task::new(f);
        let id = task.id();
        self.execute(task)?;
        Ok(id)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        (**self).execute(task)
    }
}
