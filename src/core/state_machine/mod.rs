//! Staged object state machine.
//!
//! Tracks an unbounded number of object handles across a fixed, fully
//! enumerated set of states. Every object is a member of exactly one bucket at
//! a time. Handlers registered on a state are invoked, on the executor they
//! were registered with, with each batch of objects entering that state; they
//! advance the pipeline through the [`StateController`] they are given.
//!
//! ```rust
//! use std::sync::Arc;
//! use workstage::core::{Executor, HandlerRegistration, InlineExecutor, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
//! enum Stage { Loaded, Validated }
//!
//! let machine = StateMachine::new([Stage::Loaded, Stage::Validated]);
//! let inline: Arc<dyn Executor> = Arc::new(InlineExecutor);
//! machine.register_state_change_handler(HandlerRegistration::from_fn(
//!     [Stage::Loaded],
//!     |features: Vec<u32>, _stage, controller: &workstage::core::StateController<Stage, u32>| {
//!         controller.change_state(features, Stage::Validated)?;
//!         Ok(())
//!     },
//!     inline,
//! ))?;
//!
//! machine.reset_state(vec![1, 2, 3], Stage::Loaded)?;
//! machine.notify_handlers(Stage::Loaded)?;
//! assert_eq!(machine.get_objects_in_state(Stage::Validated).len(), 3);
//! # Ok::<(), workstage::core::PoolError>(())
//! ```

mod handler;
mod membership;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::{PoolError, Task, TaskResult};

pub use handler::{HandlerRegistration, StateChangeHandler};

use handler::{Binding, Context};
use membership::Membership;

/// Requirements on state identities.
pub trait StateId: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<S> StateId for S where S: Copy + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

/// Requirements on tracked object handles.
pub trait ObjectHandle: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> ObjectHandle for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

struct Inner<S, T> {
    states: BTreeSet<S>,
    membership: RwLock<Membership<S, T>>,
    handlers: RwLock<HashMap<S, Vec<Arc<Binding<S, T>>>>>,
}

/// State machine moving object handles through an ordered set of states.
///
/// Cloning yields another handle to the same machine.
pub struct StateMachine<S, T> {
    inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for StateMachine<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StateId, T: ObjectHandle> StateMachine<S, T> {
    /// Create a machine over `states`, with every bucket empty.
    pub fn new(states: impl IntoIterator<Item = S>) -> Self {
        let states: BTreeSet<S> = states.into_iter().collect();
        debug!(states = ?states, "StateMachine created");
        Self {
            inner: Arc::new(Inner {
                membership: RwLock::new(Membership::new(states.iter().copied())),
                handlers: RwLock::new(HashMap::new()),
                states,
            }),
        }
    }

    /// The enumerated states, in their natural order.
    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.inner.states.iter().copied()
    }

    /// Attach a handler to every state listed in the registration.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` if a listed state is not one of the
    /// machine's states; nothing is registered in that case.
    pub fn register_state_change_handler(&self, registration: HandlerRegistration<S, T>) -> Result<(), PoolError> {
        let (states, binding) = registration.into_binding();
        for state in &states {
            self.inner.ensure_known(*state)?;
        }
        let mut handlers = self.inner.handlers.write();
        for state in states {
            handlers.entry(state).or_default().push(Arc::clone(&binding));
        }
        Ok(())
    }

    /// Synchronously move `objects` into `state` without invoking handlers.
    /// Objects not yet tracked start being tracked.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for an unknown state.
    pub fn reset_state(&self, objects: impl IntoIterator<Item = T>, state: S) -> Result<(), PoolError> {
        self.inner.ensure_known(state)?;
        let objects: Vec<T> = objects.into_iter().collect();
        self.inner.membership.write().move_all(&objects, state);
        trace!(state = ?state, count = objects.len(), "Objects reset");
        Ok(())
    }

    /// Reserved: has no effect on membership and never invokes handlers.
    /// Use [`StateMachine::notify_handlers`] to re-run handlers for existing
    /// members.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for an unknown state.
    pub fn reset_state_all(&self, state: S) -> Result<(), PoolError> {
        self.inner.ensure_known(state)?;
        trace!(state = ?state, "reset_state_all is a no-op");
        Ok(())
    }

    /// Dispatch the handlers registered on `state` with a snapshot of its
    /// current members, without moving anything.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for an unknown state, or the first
    /// executor's rejection.
    pub fn notify_handlers(&self, state: S) -> Result<(), PoolError> {
        self.inner.ensure_known(state)?;
        let members: Vec<T> = self.inner.membership.read().snapshot(state).into_iter().collect();
        if members.is_empty() {
            return Ok(());
        }
        for binding in self.inner.bindings_for(state) {
            self.inner.dispatch_handler(&binding, members.clone(), state)?;
        }
        Ok(())
    }

    /// Controller with no registration context, for starting transitions from
    /// outside a handler.
    #[must_use]
    pub fn controller(&self) -> StateController<S, T> {
        StateController {
            inner: Arc::clone(&self.inner),
            context: None,
        }
    }

    /// Immutable point-in-time copy of the members of `state`. Empty for an
    /// unknown state.
    #[must_use]
    pub fn get_objects_in_state(&self, state: S) -> HashSet<T> {
        self.inner.membership.read().snapshot(state)
    }

    /// Number of members of `state`.
    #[must_use]
    pub fn count_in_state(&self, state: S) -> usize {
        self.inner.membership.read().len(state)
    }

    /// Member counts of every state, taken under a single read so they always
    /// sum to the tracked population.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<S, usize> {
        self.inner.membership.read().counts()
    }

    /// Current state of `object`, if it is tracked.
    #[must_use]
    pub fn state_of(&self, object: &T) -> Option<S> {
        self.inner.membership.read().state_of(object)
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.membership.read().total()
    }

    /// Whether no objects are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: StateId, T: ObjectHandle> Inner<S, T> {
    fn ensure_known(&self, state: S) -> Result<(), PoolError> {
        if self.states.contains(&state) {
            Ok(())
        } else {
            Err(PoolError::InvalidArgument(format!("unknown state {state:?}")))
        }
    }

    fn bindings_for(&self, state: S) -> Vec<Arc<Binding<S, T>>> {
        self.handlers.read().get(&state).cloned().unwrap_or_default()
    }

    fn change_state(self: &Arc<Self>, objects: Vec<T>, to: S) -> Result<(), PoolError> {
        self.ensure_known(to)?;
        if objects.is_empty() {
            return Ok(());
        }
        let bindings = self.bindings_for(to);
        let Some(first) = bindings.first() else {
            // Nothing to run on arrival; there is no executor to defer to.
            self.membership.write().move_all(&objects, to);
            return Ok(());
        };

        let executor = Arc::clone(&first.executor);
        let inner = Arc::clone(self);
        executor.execute(Task::new(move || inner.transition(objects, to, &bindings)))
    }

    /// Runs on the first bound executor of `to`: commit the move, then hand
    /// the batch to every handler of `to`.
    fn transition(self: &Arc<Self>, objects: Vec<T>, to: S, bindings: &[Arc<Binding<S, T>>]) -> TaskResult {
        self.membership.write().move_all(&objects, to);
        trace!(state = ?to, count = objects.len(), "Transition committed");

        let Some((first, rest)) = bindings.split_first() else {
            return Ok(());
        };
        for binding in rest {
            if let Err(e) = self.dispatch_handler(binding, objects.clone(), to) {
                warn!(state = ?to, error = %e, "Handler executor rejected batch");
            }
        }
        self.invoke(first, objects, to)
    }

    fn dispatch_handler(self: &Arc<Self>, binding: &Arc<Binding<S, T>>, objects: Vec<T>, state: S) -> Result<(), PoolError> {
        let inner = Arc::clone(self);
        let task_binding = Arc::clone(binding);
        binding
            .executor
            .execute(Task::new(move || inner.invoke(&task_binding, objects, state)))
    }

    /// Call the handler once per batch-size chunk. Every chunk is attempted;
    /// the first failure is returned.
    fn invoke(self: &Arc<Self>, binding: &Binding<S, T>, objects: Vec<T>, state: S) -> TaskResult {
        let controller = StateController {
            inner: Arc::clone(self),
            context: binding.context.clone(),
        };
        let chunk_size = binding.batch_size.unwrap_or(usize::MAX);
        if objects.len() <= chunk_size {
            return binding.handler.on_state_entered(objects, state, &controller);
        }

        let mut first_error = None;
        for chunk in objects.chunks(chunk_size) {
            if let Err(e) = binding.handler.on_state_entered(chunk.to_vec(), state, &controller) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Handed to handlers; requests further transitions.
pub struct StateController<S, T> {
    inner: Arc<Inner<S, T>>,
    context: Option<Context>,
}

impl<S: StateId, T: ObjectHandle> StateController<S, T> {
    /// Asynchronously move `objects` into `new_state`.
    ///
    /// The move is queued on the first executor registered for `new_state`;
    /// when it runs, the objects leave their previous bucket and join the new
    /// one in a single step, then the handlers of `new_state` receive them.
    /// With no handler on `new_state` the move happens immediately.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for an unknown state or the
    /// executor's rejection.
    pub fn change_state(&self, objects: Vec<T>, new_state: S) -> Result<(), PoolError> {
        self.inner.change_state(objects, new_state)
    }

    /// Snapshot of the members of `state`.
    #[must_use]
    pub fn get_objects_in_state(&self, state: S) -> HashSet<T> {
        self.inner.membership.read().snapshot(state)
    }

    /// The context attached to this handler's registration, if it has type `C`.
    #[must_use]
    pub fn context<C: Any + Send + Sync>(&self) -> Option<&C> {
        self.context.as_deref().and_then(|c| c.downcast_ref::<C>())
    }

    /// Handle to the machine this controller belongs to.
    #[must_use]
    pub fn state_machine(&self) -> StateMachine<S, T> {
        StateMachine {
            inner: Arc::clone(&self.inner),
        }
    }
}
