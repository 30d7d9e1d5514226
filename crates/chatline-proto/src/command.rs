//! Outbound commands on the push channel.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Command sent to the server over the push channel.
///
/// Serialized as a JSON object tagged by its `command` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Post a message to a conversation.
    SendMessage {
        /// Target conversation.
        chat_id: u64,
        /// Message text.
        content: String,
    },

    /// Mark every message in a conversation as read.
    MarkAsRead {
        /// Target conversation.
        chat_id: u64,
    },
}

impl Command {
    /// Encode to JSON text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Conversation this command targets.
    pub fn chat_id(&self) -> u64 {
        match self {
            Self::SendMessage { chat_id, .. } | Self::MarkAsRead { chat_id } => *chat_id,
        }
    }
}
