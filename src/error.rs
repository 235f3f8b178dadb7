//! Error types for the state machine

use std::fmt::{self, Debug, Display};
use thiserror::Error;

/// Boxed error a state callback may fail with
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for state machine operations
pub type Result<T, S> = std::result::Result<T, Error<S>>;

/// Errors that abort a [`StateMachine::run`](crate::StateMachine::run) call
#[derive(Error, Debug)]
pub enum Error<S: Debug> {
    /// A transition targeted a state id that was never registered
    #[error("State {0:?} not registered")]
    StateNotRegistered(S),

    /// The builder was finished without a fallback resolver
    #[error("No fallback state configured")]
    MissingFallback,

    /// A state callback failed outright
    #[error("State {state:?} failed: {source}")]
    Handler {
        /// State whose callback failed
        state: S,
        /// The failure reported by the callback
        #[source]
        source: BoxError,
    },

    /// The drain was cancelled through its cancellation token
    #[error("Run cancelled, {discarded} queued event(s) discarded")]
    Cancelled {
        /// Events left in the queue when the drain stopped
        discarded: usize,
    },
}

/// Error condition recorded by a state through
/// [`Context::set_error`](crate::Context::set_error).
///
/// This is not a Rust error in the `?` sense: it never aborts a run. The engine
/// hands it to the fallback resolver and keeps it around for the fallback state
/// to inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateError {
    reason: String,
    details: Vec<String>,
}

impl StateError {
    /// Create an error with a reason and no details
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: Vec::new(),
        }
    }

    /// Attach one more free-form detail
    pub fn with_detail(mut self, detail: impl Display) -> Self {
        self.details.push(detail.to_string());
        self
    }

    /// Short reason given by the state
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Auxiliary diagnostic data, in the order it was given
    pub fn details(&self) -> &[String] {
        &self.details
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)?;
        if !self.details.is_empty() {
            write!(f, " ({})", self.details.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_display() {
        let plain = StateError::new("broker refused");
        assert_eq!(plain.to_string(), "broker refused");

        let detailed = StateError::new("broker refused")
            .with_detail("code=403")
            .with_detail(7);
        assert_eq!(detailed.details(), ["code=403", "7"]);
        assert_eq!(detailed.to_string(), "broker refused (code=403, 7)");
    }

    #[test]
    fn test_handler_error_source() {
        let err: Error<&str> = Error::Handler {
            state: "Connecting",
            source: "socket closed".into(),
        };
        assert_eq!(err.to_string(), "State \"Connecting\" failed: socket closed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
