//! Error types for executor operations.

use thiserror::Error;

/// Errors produced by pools, wrappers and the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The component has been shut down and no longer accepts work.
    #[error("task rejected: {0}")]
    Rejected(String),
    /// The pool's admission queue is at its configured depth.
    #[error("task queue is full")]
    QueueFull,
    /// A construction or registration argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A task run synchronously on the caller's thread failed.
    #[error("task failed: {0}")]
    TaskFailed(String),
    /// Internal failure (thread spawn, disconnected channel).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PoolError {
    pub(crate) fn shut_down(component: &str) -> Self {
        Self::Rejected(format!("{component} has been shut down"))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
