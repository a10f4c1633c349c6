//! Handler trait and registrations.

use std::any::Any;
use std::sync::Arc;

use crate::core::{Executor, TaskResult};

use super::StateController;

/// Callback invoked with the batch of objects that just entered a state.
///
/// Implemented for any `Fn(Vec<T>, S, &StateController<S, T>) -> TaskResult`.
pub trait StateChangeHandler<S, T>: Send + Sync + 'static {
    /// Handle `objects`, which are now members of `state`.
    ///
    /// # Errors
    ///
    /// A returned error is reported through the bound executor's failure
    /// path; the objects stay in `state`.
    fn on_state_entered(&self, objects: Vec<T>, state: S, controller: &StateController<S, T>) -> TaskResult;
}

impl<S, T, F> StateChangeHandler<S, T> for F
where
    F: Fn(Vec<T>, S, &StateController<S, T>) -> TaskResult + Send + Sync + 'static,
{
    fn on_state_entered(&self, objects: Vec<T>, state: S, controller: &StateController<S, T>) -> TaskResult {
        self(objects, state, controller)
    }
}

pub(super) type Context = Arc<dyn Any + Send + Sync>;

/// A handler bound to one or more states and the executor it runs on.
pub struct HandlerRegistration<S, T> {
    states: Vec<S>,
    handler: Arc<dyn StateChangeHandler<S, T>>,
    executor: Arc<dyn Executor>,
    context: Option<Context>,
    batch_size: Option<usize>,
}

pub(super) struct Binding<S, T> {
    pub handler: Arc<dyn StateChangeHandler<S, T>>,
    pub executor: Arc<dyn Executor>,
    pub context: Option<Context>,
    pub batch_size: Option<usize>,
}

impl<S, T> HandlerRegistration<S, T> {
    /// Bind `handler` to `states`, running on `executor`.
    pub fn new<H>(states: impl IntoIterator<Item = S>, handler: H, executor: Arc<dyn Executor>) -> Self
    where
        H: StateChangeHandler<S, T>,
    {
        Self {
            states: states.into_iter().collect(),
            handler: Arc::new(handler),
            executor,
            context: None,
            batch_size: None,
        }
    }

    /// Bind a closure to `states`, running on `executor`.
    pub fn from_fn<F>(states: impl IntoIterator<Item = S>, handler: F, executor: Arc<dyn Executor>) -> Self
    where
        F: Fn(Vec<T>, S, &StateController<S, T>) -> TaskResult + Send + Sync + 'static,
        S: 'static,
        T: 'static,
    {
        Self::new(states, handler, executor)
    }

    /// Attach a value the handler can read through
    /// [`StateController::context`].
    #[must_use]
    pub fn with_context<C: Any + Send + Sync>(mut self, context: C) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Invoke the handler with at most `batch_size` objects at a time.
    /// Zero is ignored.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = (batch_size > 0).then_some(batch_size);
        self
    }

    /// States this registration is attached to.
    #[must_use]
    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub(super) fn into_binding(self) -> (Vec<S>, Arc<Binding<S, T>>) {
        let binding = Binding {
            handler: self.handler,
            executor: self.executor,
            context: self.context,
            batch_size: self.batch_size,
        };
        (self.states, Arc::new(binding))
    }
}
