//! A generic asynchronous, event-queue driven finite state machine (FSM) engine
//! with error fallback states.
//!
//! # Type Parameters
//! - `S`: State identifier type. Must implement `Hash`, `Eq`, `Clone`, `Send`, `Sync` and `Debug`.
//! - `E`: Event type. Must implement `Debug` and `Send`.
//! - `D`: Session data shared across states, reachable through the [`Context`].
//!
//! # Execution model
//! [`StateMachine::run`] pushes one event to the tail of the queue and then drains
//! it: every dequeued event goes to [`State::handle`] of the current state, which
//! may enqueue or requeue further events, request a transition with
//! [`Context::set_state`] or report an error with [`Context::set_error`]. Requests
//! are applied after the callback returns, so the event being handled never
//! changes hands. A reported error sends the machine to the state chosen by the
//! fallback resolver; queued events stay queued and go to that state.
//!
//! Only one callback is ever in flight per machine (`run` takes `&mut self`), while
//! independent machines can be driven concurrently, each on its own task.
//!
//! # Errors
//! `run` fails with [`Error`] when a callback returns `Err`, when a transition
//! targets an unregistered state, or when a cancellable run is cancelled. The drain
//! is aborted and any remaining queued events are dropped.
//!
//! # See Also
//! - [`State`]: Trait for state implementations.
//! - [`Context`]: What a state can do while it runs.
//! - [`StateMachineBuilder`](crate::StateMachineBuilder): Construction and fallback wiring.
use async_trait::async_trait;
use std::fmt::{self, Display};
use std::future::Future;
use std::time::Duration;
use std::{collections::HashMap, fmt::Debug, hash::Hash};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::context::Context;
use crate::error::{BoxError, Error, Result, StateError};

// Transition log entry type - only compiled with plantuml feature in debug
#[cfg(all(feature = "plantuml", debug_assertions))]
#[derive(Debug, Clone)]
pub(crate) struct TransitionRecord<S> {
    pub from: S,
    pub to: S,
    pub trigger: String,
}

/// Outcome of a state callback. `Err` aborts the whole run.
pub type HandleResult = std::result::Result<(), BoxError>;

/// Picks the fallback state from the state that reported an error and the error itself
pub type FallbackResolver<S> = Box<dyn Fn(&S, &StateError) -> S + Send + Sync>;

#[async_trait]
/// Trait for the states of the machine.
pub trait State<S, E, D = ()>: Send + Sync
where
    S: Send + Sync + 'static,
    E: Send + 'static,
    D: Send + Sync + 'static,
{
    /// Called for every event dequeued while this is the current state.
    ///
    /// # Arguments
    /// * `event` - The dequeued event, owned by the handler from now on.
    /// * `context` - Queue, transition and error controls plus session data.
    ///
    /// # Returns
    /// `Err` only for faults that should abort the run. Recoverable problems
    /// belong in [`Context::set_error`].
    async fn handle(&mut self, event: E, context: &mut Context<S, E, D>) -> HandleResult;

    /// Called right after the machine switched to this state.
    ///
    /// Not called for the initial state. Requests made here are applied
    /// before the next event is dequeued.
    async fn on_enter(&mut self, _context: &mut Context<S, E, D>) -> HandleResult {
        Ok(())
    }

    /// Called right before the machine leaves this state.
    ///
    /// Requests made here are applied once the target state has been entered.
    async fn on_exit(&mut self, _context: &mut Context<S, E, D>) {}

    /// Optionally limits how long a single [`handle`](State::handle) call may take.
    ///
    /// A call that runs over is dropped and reported as a state error, which
    /// sends the machine to its fallback state.
    async fn timeout(&self, _data: &D) -> Option<Duration> {
        None
    }
}

/// Why a transition happened
enum Trigger {
    Requested,
    Fallback(String),
}

impl Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Requested => f.write_str("set_state"),
            Trigger::Fallback(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// How a supervised `handle` call ended
enum Outcome {
    Handled(HandleResult),
    TimedOut(Duration),
    Cancelled,
}

/// An asynchronous event-queue driven state machine.
pub struct StateMachine<S, E, D = ()>
where
    S: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    E: Debug + Send + 'static,
    D: Send + Sync + 'static,
{
    name: String,
    states: HashMap<S, Box<dyn State<S, E, D>>>,
    fallback: FallbackResolver<S>,
    context: Context<S, E, D>,

    // Transition log - only one record per unique state-to-state transition
    #[cfg(all(feature = "plantuml", debug_assertions))]
    transition_log: HashMap<(S, S), TransitionRecord<S>>,
}

impl<S, E, D> StateMachine<S, E, D>
where
    S: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    E: Debug + Send + 'static,
    D: Send + Sync + 'static,
{
    /// Assemble a machine; the builder has already checked that `initial` is registered.
    pub(crate) fn new(
        name: String,
        initial: S,
        data: D,
        states: HashMap<S, Box<dyn State<S, E, D>>>,
        fallback: FallbackResolver<S>,
    ) -> Self {
        Self {
            name,
            states,
            fallback,
            context: Context::new(initial, data),

            #[cfg(all(feature = "plantuml", debug_assertions))]
            transition_log: HashMap::new(),
        }
    }

    /// Feed one event and process it, along with everything it causes to be
    /// queued, until the queue is empty.
    ///
    /// Dropping the returned future stops the run at its current await point.
    /// Whatever it left behind (queued events, unapplied transition requests)
    /// is discarded when the next run starts.
    pub async fn run(&mut self, event: E) -> Result<(), S> {
        self.discard_leftovers();
        self.context.enqueue(std::iter::once(event));
        self.drain(None).await
    }

    /// Like [`run`](Self::run), but stops as soon as `token` is cancelled.
    ///
    /// The token is checked before every dispatch and raced against every
    /// callback, hooks included. A cancelled drain drops the remaining queued
    /// events and returns [`Error::Cancelled`]. A drain that already emptied
    /// its queue returns `Ok` even if the token fired on the way.
    pub async fn run_until_cancelled(&mut self, event: E, token: &CancellationToken) -> Result<(), S> {
        self.discard_leftovers();
        self.context.enqueue(std::iter::once(event));
        self.drain(Some(token)).await
    }

    /// Forget what an interrupted run left in the context.
    fn discard_leftovers(&mut self) {
        if self.context.has_leftovers() {
            let discarded = self.context.abort();
            warn!(
                fsm = %self.name,
                state = ?self.context.current_state(),
                discarded,
                "discarding leftovers of an interrupted run"
            );
        }
    }

    async fn drain(&mut self, cancel: Option<&CancellationToken>) -> Result<(), S> {
        loop {
            let Some(event) = self.context.pop() else {
                return Ok(());
            };
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                // Counted among the discarded events
                self.context.requeue([event]);
                return Err(self.cancelled());
            }

            let current = self.context.current_state().clone();
            let state = match self.states.get_mut(&current) {
                Some(state) => state,
                None => return Err(self.abort(Error::StateNotRegistered(current))),
            };

            trace!(fsm = %self.name, state = ?current, ?event, "dispatching event");
            let limit = state.timeout(self.context.data()).await;
            let outcome = supervise(state.handle(event, &mut self.context), limit, cancel).await;

            match outcome {
                Outcome::Handled(Ok(())) => {}
                Outcome::Handled(Err(source)) => {
                    return Err(self.abort(Error::Handler {
                        state: current,
                        source,
                    }));
                }
                Outcome::TimedOut(limit) => {
                    warn!(fsm = %self.name, state = ?current, ?limit, "handle timed out");
                    self.context.take_requested();
                    self.context.set_error_with_details(
                        "handle timed out",
                        [format!("{:?}", current), format!("{:?}", limit)],
                    );
                }
                Outcome::Cancelled => return Err(self.cancelled()),
            }

            self.settle(cancel).await?;
        }
    }

    /// Apply the transitions requested by the last callback, including the
    /// ones requested by exit/enter hooks along the way.
    async fn settle(&mut self, cancel: Option<&CancellationToken>) -> Result<(), S> {
        while let Some((target, trigger)) = self.next_transition() {
            self.transition_to(target, trigger, cancel).await?;
        }
        Ok(())
    }

    fn next_transition(&mut self) -> Option<(S, Trigger)> {
        if let Some(error) = self.context.take_pending_error() {
            let overridden = self.context.take_requested();
            let current = self.context.current_state();
            let target = (self.fallback)(current, &error);
            warn!(
                fsm = %self.name,
                state = ?current,
                fallback = ?target,
                ?overridden,
                %error,
                "state reported an error"
            );
            let trigger = Trigger::Fallback(error.reason().to_owned());
            self.context.record_error(error);
            return Some((target, trigger));
        }
        self.context
            .take_requested()
            .map(|target| (target, Trigger::Requested))
    }

    async fn transition_to(
        &mut self,
        target: S,
        trigger: Trigger,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), S> {
        if !self.states.contains_key(&target) {
            return Err(self.abort(Error::StateNotRegistered(target)));
        }

        let leaving = self.context.current_state().clone();
        if let Some(state) = self.states.get_mut(&leaving) {
            let exited = cancellable(state.on_exit(&mut self.context), cancel).await;
            if exited.is_none() {
                return Err(self.cancelled());
            }
        }

        // Update current state BEFORE entering new state
        let previous = self.context.switch_to(target.clone());
        debug!(fsm = %self.name, from = ?previous, to = ?target, %trigger, "state transition");
        self.log_transition(previous, target.clone(), &trigger);

        let state = match self.states.get_mut(&target) {
            Some(state) => state,
            None => return Err(self.abort(Error::StateNotRegistered(target))),
        };
        let entered = cancellable(state.on_enter(&mut self.context), cancel).await;
        match entered {
            Some(Ok(())) => Ok(()),
            Some(Err(source)) => Err(self.abort(Error::Handler {
                state: target,
                source,
            })),
            None => Err(self.cancelled()),
        }
    }

    fn cancelled(&mut self) -> Error<S> {
        let discarded = self.context.pending();
        self.abort(Error::Cancelled { discarded })
    }

    /// Stop the current drain: forget pending requests and queued events.
    fn abort(&mut self, err: Error<S>) -> Error<S> {
        let discarded = self.context.abort();
        error!(
            fsm = %self.name,
            state = ?self.context.current_state(),
            discarded,
            error = %err,
            "run aborted"
        );
        err
    }

    // Log a transition (only in debug builds with plantuml feature)
    #[cfg(all(feature = "plantuml", debug_assertions))]
    fn log_transition(&mut self, from: S, to: S, trigger: &Trigger) {
        let key = (from.clone(), to.clone());
        let record = TransitionRecord {
            from,
            to,
            trigger: trigger.to_string(),
        };
        self.transition_log.insert(key, record);
    }

    #[cfg(not(all(feature = "plantuml", debug_assertions)))]
    fn log_transition(&mut self, _from: S, _to: S, _trigger: &Trigger) {
        // No-op when plantuml feature is disabled or in release builds
    }

    /// Label used in log records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state
    pub fn current_state(&self) -> &S {
        self.context.current_state()
    }

    /// Number of queued events. Zero after a run returns; a run whose future
    /// was dropped may leave events here until the next run discards them.
    pub fn pending(&self) -> usize {
        self.context.pending()
    }

    /// Error behind the most recent fallback transition, unless a state took it
    pub fn last_error(&self) -> Option<&StateError> {
        self.context.last_error()
    }

    /// Get a reference to the session data
    pub fn data(&self) -> &D {
        self.context.data()
    }

    /// Get a mutable reference to the session data
    pub fn data_mut(&mut self) -> &mut D {
        self.context.data_mut()
    }

    /// Get the handle timeout of the current state
    pub async fn current_timeout(&self) -> Option<Duration> {
        match self.states.get(self.context.current_state()) {
            Some(state) => state.timeout(self.context.data()).await,
            None => None,
        }
    }

    // Export PlantUML diagram - only available with plantuml feature in debug builds
    #[cfg(all(feature = "plantuml", debug_assertions))]
    pub fn export_plantuml(&self) -> String {
        crate::plantuml::generate_plantuml(
            self.states.keys(),
            self.transition_log.values(),
            self.context.current_state(),
        )
    }

    /// Stub for export_plantuml when feature is disabled
    #[cfg(not(all(feature = "plantuml", debug_assertions)))]
    pub fn export_plantuml(&self) -> String {
        String::from("PlantUML export not available (requires 'plantuml' feature and debug build)")
    }
}

/// Run one `handle` call under the state's timeout and the run's cancellation token.
async fn supervise<F>(call: F, limit: Option<Duration>, cancel: Option<&CancellationToken>) -> Outcome
where
    F: Future<Output = HandleResult>,
{
    let limited = async move {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => Outcome::Handled(result),
                Err(_) => Outcome::TimedOut(limit),
            },
            None => Outcome::Handled(call.await),
        }
    };

    cancellable(limited, cancel).await.unwrap_or(Outcome::Cancelled)
}

/// Await `call` unless `cancel` fires first.
async fn cancellable<F>(call: F, cancel: Option<&CancellationToken>) -> Option<F::Output>
where
    F: Future,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = call => Some(output),
        },
        None => Some(call.await),
    }
}
