//! Wire envelope exchanged over WebSocket sessions.
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MESSAGE_TYPE_SESSION: &str = "session";
pub const MESSAGE_TYPE_PING: &str = "ping";
pub const MESSAGE_TYPE_PONG: &str = "pong";

/// `{"type": ..., "content": ...}` in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn new(message_type: impl Into<String>, content: Value) -> Self {
        Self {
            message_type: message_type.into(),
            content,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_type_key() {
        let text = Envelope::new("notice", json!({"a": 1})).to_text().expect("encode");
        assert_eq!(text, r#"{"type":"notice","content":{"a":1}}"#);
    }

    #[test]
    fn content_defaults_to_null() {
        let envelope = Envelope::from_text(r#"{"type":"ping"}"#).expect("decode");
        assert_eq!(envelope.message_type, MESSAGE_TYPE_PING);
        assert!(envelope.content.is_null());
        assert!(Envelope::from_text(r#"{"content":1}"#).is_err());
    }
}
