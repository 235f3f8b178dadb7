//! Message-queue client session example
//!
//! A client session driven by the event queue engine:
//! - Disconnected: waiting for the application to connect
//! - Connecting: socket open, handshake in flight (simulated latency)
//! - Ready: publishing and receiving acknowledgements
//! - Backoff: fallback state entered on any reported error
//! - Closed: terminal, ignores everything
//!
//! The example shows:
//! - Follow-up events queued from inside a state
//! - Requeueing a recovery sequence at the head of the queue
//! - Error fallback with a resolver chosen per failing state
//! - A per-state handle timeout
//! - Structured logs through `tracing` (try `RUST_LOG=async_event_fsm=trace`)

use async_event_fsm::{
    Context, Duration, HandleResult, State, StateMachine, StateMachineBuilder, async_trait,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Phase {
    Disconnected,
    Connecting,
    Ready,
    Backoff,
    Closed,
}

#[derive(Debug)]
enum Frame {
    Connect,
    ConnAck,
    Publish { topic: String, payload: String },
    PubAck(u16),
    Disconnected,
    Retry,
    Shutdown,
}

#[derive(Debug, Default)]
struct Session {
    next_packet_id: u16,
    unacked: Vec<(u16, String, String)>,
    reconnects: u32,
    broker_latency_ms: u64,
}

type Ctx = Context<Phase, Frame, Session>;

struct DisconnectedState;

#[async_trait]
impl State<Phase, Frame, Session> for DisconnectedState {
    async fn handle(&mut self, event: Frame, context: &mut Ctx) -> HandleResult {
        match event {
            Frame::Connect => {
                println!("🔌 Opening connection...");
                context.enqueue([Frame::ConnAck]);
                context.set_state(Phase::Connecting);
            }
            Frame::Shutdown => context.set_state(Phase::Closed),
            other => println!("⏸️  Not connected, dropping {:?}", other),
        }
        Ok(())
    }
}

struct ConnectingState;

#[async_trait]
impl State<Phase, Frame, Session> for ConnectingState {
    async fn on_enter(&mut self, _context: &mut Ctx) -> HandleResult {
        println!("🤝 Handshake started");
        Ok(())
    }

    async fn handle(&mut self, event: Frame, context: &mut Ctx) -> HandleResult {
        match event {
            Frame::ConnAck => {
                let latency = context.data().broker_latency_ms;
                tokio::time::sleep(Duration::from_millis(latency)).await;
                context.set_state(Phase::Ready);
            }
            other => context.set_error_with_details("unexpected frame", [format!("{:?}", other)]),
        }
        Ok(())
    }

    async fn timeout(&self, _data: &Session) -> Option<Duration> {
        Some(Duration::from_millis(100))
    }
}

struct ReadyState;

#[async_trait]
impl State<Phase, Frame, Session> for ReadyState {
    async fn on_enter(&mut self, context: &mut Ctx) -> HandleResult {
        println!("✅ Session ready ({} unacked)", context.data().unacked.len());
        Ok(())
    }

    async fn handle(&mut self, event: Frame, context: &mut Ctx) -> HandleResult {
        match event {
            Frame::Publish { topic, payload } => {
                let session = context.data_mut();
                session.next_packet_id += 1;
                let id = session.next_packet_id;
                println!("📤 [{}] {} <- {}", id, topic, payload);
                session.unacked.push((id, topic, payload));
            }
            Frame::PubAck(id) => {
                let session = context.data_mut();
                let position = session.unacked.iter().position(|(pending, _, _)| *pending == id);
                match position {
                    Some(index) => {
                        session.unacked.remove(index);
                        println!("📬 [{}] acknowledged", id);
                    }
                    None => context.set_error_with_details("unknown packet id", [id]),
                }
            }
            Frame::Disconnected => context.set_error("connection lost"),
            Frame::Shutdown => context.set_state(Phase::Closed),
            other => println!("🤷 Ignoring {:?}", other),
        }
        Ok(())
    }
}

struct BackoffState;

#[async_trait]
impl State<Phase, Frame, Session> for BackoffState {
    async fn on_enter(&mut self, context: &mut Ctx) -> HandleResult {
        if let Some(error) = context.take_error() {
            println!("⚠️  Recovering from: {}", error);
        }
        context.data_mut().reconnects += 1;
        context.enqueue([Frame::Retry]);
        Ok(())
    }

    async fn handle(&mut self, event: Frame, context: &mut Ctx) -> HandleResult {
        match event {
            Frame::Retry if context.data().reconnects > 3 => {
                println!("🛑 Giving up after {} attempts", context.data().reconnects - 1);
                context.set_state(Phase::Closed);
            }
            Frame::Retry => {
                // Reconnect, then publish the unacknowledged messages again
                let replay: Vec<Frame> = std::iter::once(Frame::ConnAck)
                    .chain(
                        context
                            .data_mut()
                            .unacked
                            .drain(..)
                            .map(|(_, topic, payload)| Frame::Publish { topic, payload }),
                    )
                    .collect();
                context.requeue(replay.into_iter().rev());
                context.set_state(Phase::Connecting);
            }
            Frame::Shutdown => context.set_state(Phase::Closed),
            _ => {}
        }
        Ok(())
    }
}

struct ClosedState;

#[async_trait]
impl State<Phase, Frame, Session> for ClosedState {
    async fn on_enter(&mut self, _context: &mut Ctx) -> HandleResult {
        println!("📴 Session closed");
        Ok(())
    }

    async fn handle(&mut self, _event: Frame, _context: &mut Ctx) -> HandleResult {
        Ok(())
    }
}

fn create_session(name: &str, broker_latency_ms: u64) -> StateMachine<Phase, Frame, Session> {
    let session = Session {
        broker_latency_ms,
        ..Session::default()
    };

    let built = StateMachineBuilder::new(Phase::Disconnected, session)
        .name(name)
        .state(Phase::Disconnected, DisconnectedState)
        .state(Phase::Connecting, ConnectingState)
        .state(Phase::Ready, ReadyState)
        .state(Phase::Backoff, BackoffState)
        .state(Phase::Closed, ClosedState)
        .fallback_fn(|state, _error| match state {
            Phase::Closed => Phase::Closed,
            _ => Phase::Backoff,
        })
        .build();

    match built {
        Ok(fsm) => fsm,
        Err(e) => panic!("invalid session wiring: {}", e),
    }
}

fn publish(topic: &str, payload: &str) -> Frame {
    Frame::Publish {
        topic: topic.to_string(),
        payload: payload.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🚀 Message queue session demo");
    println!("=============================");

    let mut session = create_session("orders-client", 10);

    session.run(Frame::Connect).await?;
    session.run(publish("orders", "order #1")).await?;
    session.run(publish("orders", "order #2")).await?;
    session.run(Frame::PubAck(1)).await?;

    println!("\n💥 Broker drops the connection");
    session.run(Frame::Disconnected).await?;
    info!(state = ?session.current_state(), unacked = session.data().unacked.len(), "after reconnect");

    println!("\n❓ Broker acknowledges a packet we never sent");
    session.run(Frame::PubAck(42)).await?;

    session.run(Frame::Shutdown).await?;
    println!("\n📊 Final state: {:?}", session.current_state());

    println!("\n🐢 A broker that is too slow to answer the handshake");
    let mut slow = create_session("slow-client", 500);
    slow.run(Frame::Connect).await?;
    println!("📊 Final state: {:?}", slow.current_state());

    #[cfg(all(feature = "plantuml", debug_assertions))]
    {
        println!("\n📊 PlantUML Diagram:");
        println!("{}", session.export_plantuml());
    }

    Ok(())
}
