//! Executors, worker pools, and the staged object state machine.

pub mod error;
pub mod interrupt;
mod task;
mod worker_pool;
mod sequential;
mod debounce;
mod timebound;
mod inline;
mod state_machine;

pub use error::{AppResult, PoolError};
pub use task::{Executor, Task, TaskId, TaskResult};
pub use worker_pool::{
    BoundedWorkerPool, NamedThreadFactory, PoolStats, ScheduledHandle, ScheduledWorkerPool, ThreadFactory, WorkerPool,
};
pub use sequential::SequentialExecutor;
pub use debounce::DebouncingScheduler;
pub use timebound::TimeboundExecutor;
pub use inline::{InlineExecutor, InlineService};
pub use state_machine::{
    HandlerRegistration, ObjectHandle, StateChangeHandler, StateController, StateId, StateMachine,
};
