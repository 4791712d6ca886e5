//! Dispatch of inbound envelopes to listeners keyed by message type.
use super::message::{Envelope, MESSAGE_TYPE_PING, MESSAGE_TYPE_PONG};
use super::registry::Session;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait MessageListener: Send + Sync {
    fn message_type(&self) -> &str;
    async fn on_message(&self, session: &Session, envelope: Envelope);
}

/// Replies `pong` to `ping`, echoing the content.
pub struct PingListener;

#[async_trait]
impl MessageListener for PingListener {
    fn message_type(&self) -> &str {
        MESSAGE_TYPE_PING
    }

    async fn on_message(&self, session: &Session, envelope: Envelope) {
        let reply = Envelope::new(MESSAGE_TYPE_PONG, envelope.content);
        if let Err(err) = session.send(&reply).await {
            tracing::debug!(session_id = session.id(), error = %err, "pong send failed");
        }
    }
}

#[derive(Default)]
pub struct ListenerSet {
    listeners: HashMap<String, Arc<dyn MessageListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set with the built-in listeners registered.
    pub fn with_defaults() -> Self {
        Self::new().with_listener(Arc::new(PingListener))
    }

    /// Register `listener`, replacing any previous one for the same type.
    pub fn with_listener(mut self, listener: Arc<dyn MessageListener>) -> Self {
        self.listeners
            .insert(listener.message_type().to_string(), listener);
        self
    }

    /// Route `envelope` by type. Returns `false` when nothing handles it.
    pub async fn dispatch(&self, session: &Session, envelope: Envelope) -> bool {
        match self.listeners.get(&envelope.message_type) {
            Some(listener) => {
                listener.on_message(session, envelope).await;
                true
            }
            None => {
                tracing::debug!(
                    session_id = session.id(),
                    message_type = %envelope.message_type,
                    "no listener for message type"
                );
                false
            }
        }
    }

    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.listeners.keys().cloned().collect();
        types.sort();
        types
    }
}

pub(crate) fn parse_inbound(text: &str) -> Option<Envelope> {
    match Envelope::from_text(text) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            tracing::debug!(error = %err, "unparseable websocket frame");
            None
        }
    }
}

pub(crate) fn session_announcement(session_id: &str) -> Envelope {
    let mut content = serde_json::Map::new();
    content.insert(
        "sessionId".to_string(),
        Value::String(session_id.to_string()),
    );
    Envelope::new(super::message::MESSAGE_TYPE_SESSION, Value::Object(content))
}
