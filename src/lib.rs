//! # Async Event FSM
//!
//! An async, event-queue driven finite state machine engine for protocol and
//! workflow logic, such as the connect/handshake/session lifecycle of a
//! message-queue client.
//!
//! ## Features
//!
//! - 🔄 **Async/Await Support**: States suspend on I/O without blocking other machines
//! - 📬 **Event Queue**: States enqueue follow-up events or requeue recovery sequences at the head
//! - 🛟 **Error Fallback**: States report errors, a resolver picks the state to recover in
//! - ⏰ **Handle Timeouts**: Per-state limits on how long a single event may take
//! - 🛑 **Cancellation**: Drains can be stopped with a `CancellationToken`
//! - 📊 **PlantUML Export**: Automatic state diagram generation (debug builds only)
//!
//! ## Quick Start
//!
//! ```rust
//! use async_event_fsm::*;
//! use async_trait::async_trait;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum Phase { Idle, Connecting, Ready, Broken }
//!
//! #[derive(Debug)]
//! enum Event { Connect, Handshake }
//!
//! struct Idle;
//!
//! #[async_trait]
//! impl State<Phase, Event> for Idle {
//!     async fn handle(&mut self, event: Event, ctx: &mut Context<Phase, Event>) -> HandleResult {
//!         if let Event::Connect = event {
//!             ctx.enqueue([Event::Handshake]);
//!             ctx.set_state(Phase::Connecting);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct Connecting;
//!
//! #[async_trait]
//! impl State<Phase, Event> for Connecting {
//!     async fn handle(&mut self, event: Event, ctx: &mut Context<Phase, Event>) -> HandleResult {
//!         match event {
//!             Event::Handshake => ctx.set_state(Phase::Ready),
//!             other => ctx.set_error_with_details("unexpected event", [format!("{:?}", other)]),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct Parked;
//!
//! #[async_trait]
//! impl State<Phase, Event> for Parked {
//!     async fn handle(&mut self, _event: Event, _ctx: &mut Context<Phase, Event>) -> HandleResult {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut fsm = StateMachineBuilder::new(Phase::Idle, ())
//!     .state(Phase::Idle, Idle)
//!     .state(Phase::Connecting, Connecting)
//!     .state(Phase::Ready, Parked)
//!     .state(Phase::Broken, Parked)
//!     .fallback(Phase::Broken)
//!     .build()?;
//!
//! fsm.run(Event::Connect).await?;
//! assert_eq!(fsm.current_state(), &Phase::Ready);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub use async_trait::async_trait;

mod builder;
mod context;
mod error;
mod fsm;

#[cfg(all(feature = "plantuml", debug_assertions))]
mod plantuml;

pub use builder::StateMachineBuilder;
pub use context::Context;
pub use error::{BoxError, Error, Result, StateError};
pub use fsm::{FallbackResolver, HandleResult, State, StateMachine};

pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

pub mod prelude {
    //! Prelude module for convenient imports
    pub use crate::{
        CancellationToken, Context, Error, HandleResult, Result, State, StateError, StateMachine,
        StateMachineBuilder,
    };
    pub use async_trait::async_trait;
    pub use std::time::Duration;
}
