//! Inbound push frames.
//!
//! Every frame on the push channel is a JSON object discriminated by its
//! `type` field. Decoding is done once, here; callers dispatch on the
//! [`PushFrame`] variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    WireMessage,
    errors::{ProtocolError, Result},
};

/// `type` value of a new-message push.
pub const CHAT_MESSAGE_TYPE: &str = "chat.message";

/// A new message delivered to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageFrame {
    /// Target conversation.
    pub chat_id: u64,
    /// The confirmed message.
    pub message: WireMessage,
    /// Free-form sender label attached by the server (e.g. `"user_1"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PushFrame {
    /// `chat.message`
    #[serde(rename = "chat.message")]
    ChatMessage(ChatMessageFrame),
}

impl PushFrame {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the text is not a JSON object or a
    ///   known frame type lacks required fields
    /// - [`ProtocolError::MissingType`] if there is no string `type` field
    /// - [`ProtocolError::UnknownType`] for well-formed frames of other types
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let Value::Object(ref object) = value else {
            return Err(ProtocolError::Malformed("frame is not a JSON object".to_string()));
        };

        let Some(kind) = object.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };

        match kind {
            CHAT_MESSAGE_TYPE => serde_json::from_value(value)
                .map(Self::ChatMessage)
                .map_err(|e| ProtocolError::Malformed(format!("{CHAT_MESSAGE_TYPE}: {e}"))),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Encode to the JSON text the server would send.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Conversation this frame targets.
    pub fn chat_id(&self) -> u64 {
        match self {
            Self::ChatMessage(frame) => frame.chat_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{
        "type": "chat.message",
        "chat_id": 1,
        "message": {
            "id": 55,
            "content": "hi",
            "sender": { "id": 9, "username": "me" },
            "timestamp": "2024-05-01T10:00:00Z"
        },
        "sender": "user_9"
    }"#;

    #[test]
    fn decodes_chat_message() {
        let PushFrame::ChatMessage(frame) = PushFrame::decode(FRAME).unwrap();
        assert_eq!(frame.chat_id, 1);
        assert_eq!(frame.message.id, 55);
        assert_eq!(frame.sender.as_deref(), Some("user_9"));
    }

    #[test]
    fn sender_label_is_optional() {
        let text = FRAME.replace(r#""sender": "user_9""#, r#""extra": true"#);
        let PushFrame::ChatMessage(frame) = PushFrame::decode(&text).unwrap();
        assert!(frame.sender.is_none());
    }

    #[test]
    fn rejects_non_json() {
        let err = PushFrame::decode("not json").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn rejects_non_object() {
        assert!(PushFrame::decode("[1, 2]").unwrap_err().is_malformed());
        assert!(PushFrame::decode("null").unwrap_err().is_malformed());
    }

    #[test]
    fn rejects_missing_type() {
        assert_eq!(PushFrame::decode(r#"{"chat_id": 1}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn unknown_type_is_not_malformed() {
        let err = PushFrame::decode(r#"{"type": "chat.typing", "chat_id": 1}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("chat.typing".to_string()));
        assert!(!err.is_malformed());
    }

    #[test]
    fn rejects_chat_message_without_message() {
        let err = PushFrame::decode(r#"{"type": "chat.message", "chat_id": 1}"#).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn encode_then_decode_preserves_frame() {
        let frame = PushFrame::decode(FRAME).unwrap();
        let text = frame.encode().unwrap();
        assert_eq!(PushFrame::decode(&text).unwrap(), frame);
        assert_eq!(frame.chat_id(), 1);
    }
}
