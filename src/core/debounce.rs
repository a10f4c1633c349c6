//! Coalescing of rapid submissions into a single delayed run.
//!
//! A *burst* starts with the first submission after the previous run. Every
//! submission replaces the pending task and re-arms the timer for
//! `min_delay` of silence; with a `max_delay`, the re-armed deadline never
//! moves past `burst_start + max_delay`. Exactly one task per burst runs: the
//! most recently submitted one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::DebounceConfig;

use super::{Executor, PoolError, ScheduledHandle, ScheduledWorkerPool, Task};

struct PendingBurst {
    task: Task,
    generation: u64,
    started_at: Instant,
    scheduled: ScheduledHandle,
}

#[derive(Default)]
struct DebounceState {
    pending: Option<PendingBurst>,
    next_generation: u64,
}

/// Last-write-wins scheduler on top of a [`ScheduledWorkerPool`].
pub struct DebouncingScheduler {
    pool: Arc<ScheduledWorkerPool>,
    min_delay: Duration,
    max_delay: Option<Duration>,
    state: Arc<Mutex<DebounceState>>,
}

impl DebouncingScheduler {
    /// Debounce with a quiet period and no cap: while submissions keep
    /// arriving less than `min_delay_ms` apart, nothing runs.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` if `min_delay_ms` is negative.
    pub fn new(pool: Arc<ScheduledWorkerPool>, min_delay_ms: i64) -> Result<Self, PoolError> {
        Self::from_config(
            pool,
            &DebounceConfig {
                min_delay_ms,
                max_delay_ms: None,
            },
        )
    }

    /// Debounce with a quiet period, running no later than `max_delay_ms`
    /// after the first submission of a burst.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` if `min_delay_ms` is negative or
    /// `max_delay_ms < min_delay_ms`.
    pub fn with_max_delay(
        pool: Arc<ScheduledWorkerPool>,
        min_delay_ms: i64,
        max_delay_ms: i64,
    ) -> Result<Self, PoolError> {
        Self::from_config(
            pool,
            &DebounceConfig {
                min_delay_ms,
                max_delay_ms: Some(max_delay_ms),
            },
        )
    }

    /// Build from a validated configuration section.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` if the configuration is invalid.
    pub fn from_config(pool: Arc<ScheduledWorkerPool>, config: &DebounceConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidArgument)?;
        Ok(Self {
            pool,
            min_delay: Duration::from_millis(config.min_delay_ms.unsigned_abs()),
            max_delay: config
                .max_delay_ms
                .map(|ms| Duration::from_millis(ms.unsigned_abs())),
            state: Arc::new(Mutex::new(DebounceState::default())),
        })
    }

    /// Whether a task is waiting for its burst to end.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    fn delay_for(&self, now: Instant, started_at: Instant) -> Duration {
        match self.max_delay {
            Some(max) => {
                let cap = (started_at + max).saturating_duration_since(now);
                self.min_delay.min(cap)
            }
            None => self.min_delay,
        }
    }
}

impl Executor for DebouncingScheduler {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let started_at = match state.pending.take() {
            Some(superseded) => {
                superseded.scheduled.cancel();
                trace!(task_id = superseded.task.id(), "Superseded pending debounced task");
                superseded.started_at
            }
            None => now,
        };

        let generation = state.next_generation;
        state.next_generation += 1;
        let delay = self.delay_for(now, started_at);

        let fire_state = Arc::clone(&self.state);
        let fire = Task::new(move || fire_pending(&fire_state, generation));
        let scheduled = self.pool.schedule(fire, delay)?;

        debug!(task_id = task.id(), delay_ms = delay.as_millis(), "Debounced task pending");
        state.pending = Some(PendingBurst {
            task,
            generation,
            started_at,
            scheduled,
        });
        Ok(())
    }
}

fn fire_pending(state: &Mutex<DebounceState>, generation: u64) -> anyhow::Result<()> {
    let mut guard = state.lock();
    // A newer submission may have raced the timer; only its own firing runs it.
    if guard
        .pending
        .as_ref()
        .is_none_or(|burst| burst.generation != generation)
    {
        return Ok(());
    }
    let burst = guard.pending.take();
    drop(guard);

    match burst {
        Some(burst) => burst.task.run(),
        None => Ok(()),
    }
}
