//! WebSocket push: session registry, inbound dispatch and the upgrade handler.
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;

pub use listener::{ListenerSet, MessageListener, PingListener};
pub use message::Envelope;
pub use registry::{DEFAULT_SEND_TIMEOUT, SendError, Session, SessionRegistry, SessionSink};
