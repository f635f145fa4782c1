//! State mutators: event-type keyed state transitions.
//!
//! A [`StateMutator`] is built once per aggregate type and holds a table
//! from event type (see [`Event::event_type`]) to a pure
//! `(event, state) -> state` function. The same table drives live command
//! handling and offline replay, so both paths compute identical state.
//!
//! An event with no registered transition is fatal: an aggregate that cannot
//! explain one of its own events is corrupt.

use crate::event::{Event, EventEnvelope};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A pure state transition.
pub type Transition<S, E> = fn(&E, S) -> S;

/// Errors raised while applying events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutatorError {
    /// No transition is registered for the event type.
    #[error("no transition registered for {event_type} on {state_type}")]
    UnhandledEventKind {
        /// Event type that could not be applied.
        event_type: String,
        /// Rust type of the state being mutated.
        state_type: &'static str,
    },
}

/// Event-type keyed registry of state transitions plus the current state.
///
/// # Example
///
/// ```
/// use eventloom_core::event::Event;
/// use eventloom_core::mutator::StateMutator;
///
/// #[derive(Clone, Debug)]
/// enum CounterEvent { Incremented(u32) }
///
/// impl Event for CounterEvent {
///     fn event_type(&self) -> &'static str { "Incremented.v1" }
/// }
///
/// let mut mutator = StateMutator::new(0_u32)
///     .register("Incremented.v1", |event: &CounterEvent, total| match event {
///         CounterEvent::Incremented(by) => total + by,
///     });
///
/// mutator.apply(&CounterEvent::Incremented(2)).unwrap();
/// mutator.apply(&CounterEvent::Incremented(3)).unwrap();
/// assert_eq!(*mutator.current(), 5);
/// ```
#[derive(Clone)]
pub struct StateMutator<S, E> {
    transitions: HashMap<&'static str, Transition<S, E>>,
    default_state: S,
    current: S,
}

impl<S: Clone, E: Event> StateMutator<S, E> {
    /// Create a mutator with no transitions, positioned at `default_state`.
    #[must_use]
    pub fn new(default_state: S) -> Self {
        Self {
            transitions: HashMap::new(),
            current: default_state.clone(),
            default_state,
        }
    }

    /// Register the transition for an event type, replacing any previous one.
    #[must_use]
    pub fn register(mut self, event_type: &'static str, transition: Transition<S, E>) -> Self {
        self.transitions.insert(event_type, transition);
        self
    }

    /// Apply one committed event.
    ///
    /// # Errors
    ///
    /// Returns [`MutatorError::UnhandledEventKind`] if the envelope's event
    /// type has no registered transition. The current state is unchanged.
    pub fn transition<Id>(&mut self, envelope: &EventEnvelope<Id, E>) -> Result<(), MutatorError> {
        self.apply(envelope.payload())
    }

    /// Apply one event payload.
    ///
    /// # Errors
    ///
    /// Returns [`MutatorError::UnhandledEventKind`] if the event type has no
    /// registered transition. The current state is unchanged.
    pub fn apply(&mut self, event: &E) -> Result<(), MutatorError> {
        let event_type = event.event_type();
        let transition = self
            .transitions
            .get(event_type)
            .ok_or_else(|| MutatorError::UnhandledEventKind {
                event_type: event_type.to_string(),
                state_type: std::any::type_name::<S>(),
            })?;

        let state = std::mem::replace(&mut self.current, self.default_state.clone());
        self.current = transition(event, state);
        Ok(())
    }

    /// Replace the current state with one computed earlier (e.g. a snapshot).
    pub fn seed(&mut self, state: S) {
        self.current = state;
    }

    /// Return to the default state, keeping the transitions.
    pub fn reset(&mut self) {
        self.current = self.default_state.clone();
    }

    /// The latest state.
    pub const fn current(&self) -> &S {
        &self.current
    }

    /// The start-of-time state.
    pub const fn default_state(&self) -> &S {
        &self.default_state
    }

    /// Consume the mutator and return its latest state.
    pub fn into_state(self) -> S {
        self.current
    }

    /// Whether a transition is registered for `event_type`.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.transitions.contains_key(event_type)
    }

    /// Number of registered transitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether no transitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl<S: fmt::Debug, E> fmt::Debug for StateMutator<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.transitions.keys().collect();
        kinds.sort_unstable();
        f.debug_struct("StateMutator")
            .field("transitions", &kinds)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
