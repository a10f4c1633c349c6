//! Bridges from the blocking executor lifecycle into a tokio runtime.

pub mod tokio_bridge;

pub use tokio_bridge::{await_termination_async, TokioBlockingExecutor};
