//! Builder pattern implementation for state machines

use crate::error::{Error, Result, StateError};
use crate::fsm::{FallbackResolver, State, StateMachine};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Builder for constructing state machines
pub struct StateMachineBuilder<S, E, D = ()>
where
    S: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    E: Debug + Send + 'static,
    D: Send + Sync + 'static,
{
    name: String,
    initial: S,
    data: D,
    states: HashMap<S, Box<dyn State<S, E, D>>>,
    fallback: Option<FallbackResolver<S>>,
}

impl<S, E, D> StateMachineBuilder<S, E, D>
where
    S: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    E: Debug + Send + 'static,
    D: Send + Sync + 'static,
{
    /// Create a new builder starting in `initial` with the given session data
    pub fn new(initial: S, data: D) -> Self {
        Self {
            name: String::from("fsm"),
            initial,
            data,
            states: HashMap::new(),
            fallback: None,
        }
    }

    /// Add a state to the state machine
    pub fn state<T>(mut self, state_id: S, state_impl: T) -> Self
    where
        T: State<S, E, D> + 'static,
    {
        self.states.insert(state_id, Box::new(state_impl));
        self
    }

    /// Always fall back to `state_id` when a state reports an error
    pub fn fallback(self, state_id: S) -> Self {
        self.fallback_fn(move |_, _| state_id.clone())
    }

    /// Choose the fallback state from the failing state and its error
    pub fn fallback_fn<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&S, &StateError) -> S + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(resolver));
        self
    }

    /// Label the instance in log records
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build the state machine
    ///
    /// Fails when no fallback was configured or the initial state has no
    /// implementation.
    pub fn build(self) -> Result<StateMachine<S, E, D>, S> {
        let fallback = self.fallback.ok_or(Error::MissingFallback)?;
        if !self.states.contains_key(&self.initial) {
            return Err(Error::StateNotRegistered(self.initial));
        }
        Ok(StateMachine::new(
            self.name,
            self.initial,
            self.data,
            self.states,
            fallback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, HandleResult};
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Light {
        Green,
        Red,
    }

    struct Noop;

    #[async_trait]
    impl State<Light, u8> for Noop {
        async fn handle(&mut self, _event: u8, _context: &mut Context<Light, u8>) -> HandleResult {
            Ok(())
        }
    }

    #[test]
    fn test_fallback_is_required() {
        let result = StateMachineBuilder::new(Light::Green, ())
            .state(Light::Green, Noop)
            .build();

        assert!(matches!(result, Err(Error::MissingFallback)));
    }

    #[test]
    fn test_initial_state_must_be_registered() {
        let result = StateMachineBuilder::new(Light::Green, ())
            .state(Light::Red, Noop)
            .fallback(Light::Red)
            .build();

        assert!(matches!(result, Err(Error::StateNotRegistered(Light::Green))));
    }

    #[test]
    fn test_build_with_defaults() {
        let fsm = StateMachineBuilder::new(Light::Green, ())
            .state(Light::Green, Noop)
            .state(Light::Red, Noop)
            .fallback(Light::Red)
            .build()
            .unwrap();

        assert_eq!(fsm.current_state(), &Light::Green);
        assert_eq!(fsm.name(), "fsm");
    }

    #[test]
    fn test_named_instance() {
        let fsm = StateMachineBuilder::new(Light::Green, ())
            .name("crossing-7")
            .state(Light::Green, Noop)
            .fallback_fn(|_, _| Light::Green)
            .build()
            .unwrap();

        assert_eq!(fsm.name(), "crossing-7");
    }
}
