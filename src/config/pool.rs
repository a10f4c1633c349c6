//! Pool, debounce and watchdog configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_thread_name_prefix() -> String {
    "workstage-worker".to_string()
}

/// Configuration for a [`BoundedWorkerPool`](crate::core::BoundedWorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of dedicated worker threads.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Maximum queued tasks before `QueueFull`; unbounded when `None`.
    #[serde(default)]
    pub max_queue_depth: Option<usize>,
    /// Worker threads are named `<prefix>-<index>`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Worker stack size in bytes; platform default when `None`.
    #[serde(default)]
    pub thread_stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_queue_depth: None,
            thread_name_prefix: default_thread_name_prefix(),
            thread_stack_size: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Default configuration: one worker per CPU, unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Bound the admission queue.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }
}

/// Configuration for a [`DebouncingScheduler`](crate::core::DebouncingScheduler).
///
/// Delays are signed so that out-of-range values read from configuration can
/// be reported instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet period after the last submission before the pending task runs.
    pub min_delay_ms: i64,
    /// Upper bound on the wait measured from the first submission of a burst.
    #[serde(default)]
    pub max_delay_ms: Option<i64>,
}

impl DebounceConfig {
    /// Validate delay bounds.
    ///
    /// # Errors
    ///
    /// Returns a description if `min_delay_ms` is negative or `max_delay_ms`
    /// is below it.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay_ms < 0 {
            return Err(format!("min_delay_ms must be >= 0, got {}", self.min_delay_ms));
        }
        if let Some(max) = self.max_delay_ms {
            if max < self.min_delay_ms {
                return Err(format!(
                    "max_delay_ms ({max}) must be >= min_delay_ms ({})",
                    self.min_delay_ms
                ));
            }
        }
        Ok(())
    }
}

/// Configuration for a [`TimeboundExecutor`](crate::core::TimeboundExecutor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeboundConfig {
    /// Execution time after which a task's thread is interrupted.
    pub time_limit_ms: u64,
}

impl TimeboundConfig {
    /// Validate the time limit.
    ///
    /// # Errors
    ///
    /// Returns a description if the limit is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_limit_ms == 0 {
            return Err("time_limit_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for an application's executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, WorkerPoolConfig>,
    /// Default debounce settings.
    #[serde(default)]
    pub debounce: Option<DebounceConfig>,
    /// Default watchdog settings.
    #[serde(default)]
    pub timebound: Option<TimeboundConfig>,
}

impl ToolkitConfig {
    /// Validate all sections and ensure at least one pool exists.
    ///
    /// # Errors
    ///
    /// Returns a description naming the offending section.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        if let Some(debounce) = &self.debounce {
            debounce
                .validate()
                .map_err(|e| format!("debounce invalid: {e}"))?;
        }
        if let Some(timebound) = &self.timebound {
            timebound
                .validate()
                .map_err(|e| format!("timebound invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
