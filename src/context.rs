//! Execution context handed to states while they run

use std::collections::VecDeque;
use std::fmt::Display;

use crate::error::StateError;

/// Per-instance execution context: the event queue, the current state id,
/// the transition requests of the callback being run, and the integrator's
/// session data `D`.
///
/// States only ever see a `Context` through the `&mut` reference passed to
/// their callbacks, so the queue and the current-state pointer cannot be
/// touched while no dispatch is in flight.
#[derive(Debug)]
pub struct Context<S, E, D = ()> {
    queue: VecDeque<E>,
    current: S,
    requested: Option<S>,
    pending_error: Option<StateError>,
    last_error: Option<StateError>,
    data: D,
}

impl<S, E, D> Context<S, E, D> {
    pub(crate) fn new(initial: S, data: D) -> Self {
        Self {
            queue: VecDeque::new(),
            current: initial,
            requested: None,
            pending_error: None,
            last_error: None,
            data,
        }
    }

    /// Append events to the tail of the queue, keeping their order.
    pub fn enqueue<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = E>,
    {
        self.queue.extend(events);
    }

    /// Insert events at the head of the queue.
    ///
    /// Events are pushed one by one in the order given, so they end up in
    /// reversed order: `requeue([x, y, z])` on `[a, b]` gives `[z, y, x, a, b]`
    /// and `z` is dispatched next.
    ///
    /// To replay a sequence front to back, pass it reversed:
    /// `context.requeue(replay.into_iter().rev())`.
    pub fn requeue<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = E>,
    {
        for event in events {
            self.queue.push_front(event);
        }
    }

    /// Switch to `state` once the running callback returns.
    ///
    /// The event being handled stays with the current state. Calling this
    /// twice in one callback keeps the last target.
    pub fn set_state(&mut self, state: S) {
        self.requested = Some(state);
    }

    /// Record an error; the machine moves to its fallback state once the
    /// running callback returns.
    ///
    /// Takes precedence over any [`set_state`](Self::set_state) made in the
    /// same callback. Queued events are left alone and will be handled by the
    /// fallback state.
    pub fn set_error(&mut self, reason: impl Into<String>) {
        self.pending_error = Some(StateError::new(reason));
    }

    /// Same as [`set_error`](Self::set_error) with free-form details attached.
    pub fn set_error_with_details<I>(&mut self, reason: impl Into<String>, details: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let error = details
            .into_iter()
            .fold(StateError::new(reason), |error, detail| error.with_detail(detail));
        self.pending_error = Some(error);
    }

    /// State the machine is in. Requests made by the running callback are not
    /// reflected until it returns.
    pub fn current_state(&self) -> &S {
        &self.current
    }

    /// Number of events waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Error that triggered the most recent fallback transition
    pub fn last_error(&self) -> Option<&StateError> {
        self.last_error.as_ref()
    }

    /// Consume the error that triggered the most recent fallback transition
    pub fn take_error(&mut self) -> Option<StateError> {
        self.last_error.take()
    }

    /// Integrator session data
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Mutable integrator session data
    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub(crate) fn pop(&mut self) -> Option<E> {
        self.queue.pop_front()
    }

    pub(crate) fn switch_to(&mut self, state: S) -> S {
        std::mem::replace(&mut self.current, state)
    }

    pub(crate) fn take_requested(&mut self) -> Option<S> {
        self.requested.take()
    }

    pub(crate) fn take_pending_error(&mut self) -> Option<StateError> {
        self.pending_error.take()
    }

    pub(crate) fn record_error(&mut self, error: StateError) {
        self.last_error = Some(error);
    }

    /// Whether a run left anything behind: queued events or a transition
    /// request that was never applied.
    pub(crate) fn has_leftovers(&self) -> bool {
        !self.queue.is_empty() || self.requested.is_some() || self.pending_error.is_some()
    }

    /// Drop transition requests and queued events after a failed drain.
    /// Returns how many events were discarded.
    pub(crate) fn abort(&mut self) -> usize {
        self.requested = None;
        self.pending_error = None;
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }
}
