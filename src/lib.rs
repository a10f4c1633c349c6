//! # Workstage
//!
//! Concurrency building blocks for staged, multi-threaded data pipelines.
//!
//! Everything that runs work implements the [`Executor`](crate::core::Executor) seam; the
//! components that own threads additionally implement [`WorkerPool`](crate::core::WorkerPool) and
//! follow the same lifecycle: graceful `shutdown`, forced `shutdown_now`
//! (which interrupts running tasks and hands back the ones that never
//! started) and a bounded `await_termination`.
//!
//! ## Components
//!
//! - **`BoundedWorkerPool`**: fixed set of worker threads over a FIFO queue,
//!   with an optional admission limit.
//! - **`ScheduledWorkerPool`**: a bounded pool fronted by a timer for delayed,
//!   cancellable work.
//! - **`SequentialExecutor`**: strict one-at-a-time FIFO on top of any executor.
//! - **`DebouncingScheduler`**: collapses bursts of submissions into one run of
//!   the latest task, optionally capped by a maximum delay.
//! - **`TimeboundExecutor`**: interrupts tasks that exceed a time limit.
//! - **`InlineExecutor` / `InlineService`**: run work on the caller's thread.
//! - **`StateMachine`**: moves object handles between enumerated states and
//!   dispatches state-entry handlers on their bound executors.
//!
//! Interruption is cooperative: long-running tasks poll
//! [`is_interrupted`](crate::core::interrupt::is_interrupted) or sleep through
//! [`interrupt::sleep`](crate::core::interrupt::sleep), which returns early when interrupted.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workstage::config::WorkerPoolConfig;
//! use workstage::core::{BoundedWorkerPool, Executor, SequentialExecutor, WorkerPool};
//!
//! let pool = Arc::new(BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(4))?);
//! let serial = SequentialExecutor::new(Arc::clone(&pool));
//! for layer in ["roads", "rivers", "parcels"] {
//!     serial.submit(move || {
//!         tracing::info!(layer, "Indexing layer");
//!         Ok(())
//!     })?;
//! }
//! pool.shutdown();
//! assert!(pool.await_termination(Duration::from_secs(5)));
//! # Ok::<(), workstage::core::PoolError>(())
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Executors, worker pools, and the staged object state machine.
pub mod core;
/// Configuration models for pools, debouncing, and time limits.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Bridges from the blocking lifecycle into async runtimes.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
