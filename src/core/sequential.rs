//! Strict FIFO, one-at-a-time execution on top of any executor.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::{Executor, PoolError, Task, TaskId};

const RETRY_BACKOFF_MIN: Duration = Duration::from_millis(1);
const RETRY_BACKOFF_MAX: Duration = Duration::from_millis(50);

struct SerialState {
    queue: VecDeque<Task>,
    /// A task from this queue is currently dispatched to the wrapped executor,
    /// or the queue head is waiting for the wrapped executor to make room.
    active: bool,
}

struct Inner<E: ?Sized> {
    state: Mutex<SerialState>,
    target: Arc<E>,
}

/// Runs submitted tasks one after another, in submission order.
///
/// Task *i + 1* is only handed to the wrapped executor after task *i* has
/// returned, however many idle workers the wrapped pool has.
///
/// When the wrapped executor reports [`PoolError::QueueFull`] for a task that
/// was already accepted here, that task stays at the head of the queue and is
/// offered again after a short backoff. A [`PoolError::Rejected`] hand-off
/// means the wrapped executor is shut down; the queue is then discarded.
pub struct SequentialExecutor<E: Executor + ?Sized + 'static = dyn Executor> {
    inner: Arc<Inner<E>>,
}

impl<E: Executor + ?Sized + 'static> SequentialExecutor<E> {
    /// Serialize execution onto `target`.
    pub fn new(target: Arc<E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SerialState {
                    queue: VecDeque::new(),
                    active: false,
                }),
                target,
            }),
        }
    }

    /// Tasks waiting behind the one currently dispatched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl<E: Executor + ?Sized + 'static> Clone for SequentialExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Executor + ?Sized + 'static> Executor for SequentialExecutor<E> {
    fn execute(&self, task: Task) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock();
        if state.active {
            state.queue.push_back(task);
            return Ok(());
        }
        // Idle implies an empty queue, so this task goes straight out.
        state.active = true;
        drop(state);

        let (result, flow) = pump(&self.inner, task, true);
        if matches!(flow, Flow::Backpressure) {
            retry_later(&self.inner);
        }
        result
    }
}

/// Where the queue stands once [`pump`] returns.
enum Flow {
    /// The queue ran dry and `active` was cleared.
    Idle,
    /// A task is running elsewhere; its completion continues the queue.
    InFlight,
    /// The wrapped executor is full. The head task was put back and `active`
    /// is still set.
    Backpressure,
    /// The wrapped executor refused work for good and the queue was discarded.
    Closed,
}

/// One task handed to the wrapped executor.
///
/// The original task stays in `task` until the wrapper runs, so a dispatch the
/// wrapped executor refuses can be taken back.
struct Dispatch {
    task: Mutex<Option<Task>>,
    gate: Mutex<Gate>,
}

struct Gate {
    /// The dispatching thread is still inside the wrapped `execute` call.
    submitting: bool,
    /// The task completed before that call returned.
    finished: bool,
}

impl Dispatch {
    fn new(task: Task) -> Arc<Self> {
        Arc::new(Self {
            task: Mutex::new(Some(task)),
            gate: Mutex::new(Gate {
                submitting: true,
                finished: false,
            }),
        })
    }

    fn wrapper<E: Executor + ?Sized + 'static>(self: &Arc<Self>, task_id: TaskId, owner: &Arc<Inner<E>>) -> Task {
        let dispatch = Arc::clone(self);
        let owner = Arc::clone(owner);
        Task::with_id(task_id, move || {
            let Some(task) = dispatch.task.lock().take() else {
                return Ok(());
            };
            let outcome = task.run();
            // Whoever sees the task finish second continues the queue, so a
            // synchronous target loops in `pump` rather than recursing here.
            let mut gate = dispatch.gate.lock();
            if gate.submitting {
                gate.finished = true;
            } else {
                drop(gate);
                advance(&owner);
            }
            outcome
        })
    }

    /// Mark the wrapped `execute` call as returned; reports whether the task
    /// already finished.
    fn end_submission(&self) -> bool {
        let mut gate = self.gate.lock();
        gate.submitting = false;
        gate.finished
    }

    fn reclaim(&self) -> Option<Task> {
        self.task.lock().take()
    }
}

/// Hand `task` and its successors to the wrapped executor until one is in
/// flight on another thread, the queue runs dry, or the executor pushes back.
///
/// With `from_caller` set, `task` is the caller's own submission: a refusal
/// of it is returned instead of retried, and the queue behind it still moves.
fn pump<E: Executor + ?Sized + 'static>(
    inner: &Arc<Inner<E>>,
    mut task: Task,
    from_caller: bool,
) -> (Result<(), PoolError>, Flow) {
    let mut result = Ok(());
    let mut first = from_caller;
    loop {
        let task_id = task.id();
        let dispatch = Dispatch::new(task);
        let outcome = inner.target.execute(dispatch.wrapper(task_id, inner));
        let finished = dispatch.end_submission();

        match outcome {
            Ok(()) if !finished => return (result, Flow::InFlight),
            Ok(()) => {}
            // An inline target reports the task's own failure; it still ran.
            Err(e @ PoolError::TaskFailed(_)) => {
                if first {
                    result = Err(e);
                } else {
                    warn!(task_id, error = %e, "Sequential task failed");
                }
            }
            Err(e) => match dispatch.reclaim() {
                // The wrapper took the task after all.
                None => {}
                Some(task) if matches!(e, PoolError::QueueFull) => {
                    if first {
                        debug!(task_id, "Wrapped executor is full; returning submission to caller");
                        result = Err(e);
                    } else {
                        trace!(task_id, "Wrapped executor is full; holding sequential hand-off");
                        inner.state.lock().queue.push_front(task);
                        return (result, Flow::Backpressure);
                    }
                }
                Some(_) => {
                    discard(inner, task_id, &e);
                    if first {
                        result = Err(e);
                    }
                    return (result, Flow::Closed);
                }
            },
        }

        first = false;
        let mut state = inner.state.lock();
        let Some(next) = state.queue.pop_front() else {
            state.active = false;
            return (result, Flow::Idle);
        };
        drop(state);
        trace!(task_id = next.id(), "Dispatching next sequential task");
        task = next;
    }
}

/// Continue the queue after a dispatched task completed on another thread.
fn advance<E: Executor + ?Sized + 'static>(inner: &Arc<Inner<E>>) {
    let mut state = inner.state.lock();
    let Some(next) = state.queue.pop_front() else {
        state.active = false;
        return;
    };
    drop(state);

    trace!(task_id = next.id(), "Dispatching next sequential task");
    if matches!(pump(inner, next, false).1, Flow::Backpressure) {
        retry_later(inner);
    }
}

/// Offer the held queue head again from a helper thread, backing off while the
/// wrapped executor stays full.
///
/// The hand-off may be running on one of the wrapped pool's own workers, which
/// must return before the pool can make room, so the retry never waits there.
fn retry_later<E: Executor + ?Sized + 'static>(inner: &Arc<Inner<E>>) {
    let owner = Arc::clone(inner);
    let spawned = thread::Builder::new()
        .name("workstage-sequential-retry".into())
        .spawn(move || {
            let mut backoff = RETRY_BACKOFF_MIN;
            loop {
                thread::sleep(backoff);
                let mut state = owner.state.lock();
                let Some(head) = state.queue.pop_front() else {
                    state.active = false;
                    return;
                };
                drop(state);
                if !matches!(pump(&owner, head, false).1, Flow::Backpressure) {
                    return;
                }
                backoff = (backoff * 2).min(RETRY_BACKOFF_MAX);
            }
        });
    if let Err(e) = spawned {
        error!(error = %e, "Failed to spawn sequential retry thread");
        discard(inner, 0, &PoolError::Internal(e.to_string()));
    }
}

/// Drop everything still queued and go idle.
fn discard<E: ?Sized>(inner: &Inner<E>, task_id: TaskId, error: &PoolError) {
    let mut state = inner.state.lock();
    let discarded = state.queue.len();
    state.queue.clear();
    state.active = false;
    drop(state);
    warn!(task_id, discarded, error = %error, "Wrapped executor refused sequential hand-off");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InlineExecutor;

    #[test]
    fn test_inline_target_preserves_order() {
        let serial = SequentialExecutor::new(Arc::new(InlineExecutor));
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            serial.execute(Task::from_fn(move || seen.lock().push(i))).unwrap();
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(serial.pending(), 0);
    }
}
