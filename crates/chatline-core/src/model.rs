//! Domain model.
//!
//! Wire types from [`chatline_proto`] are converted into these once, at the
//! store boundary. The conversion needs to know who the local user is, so it
//! goes through [`CurrentUser`].

use std::fmt;

use chatline_proto::{ChatSummary, WireMessage, WireSender};
use chrono::{DateTime, Utc};

/// Server-assigned conversation ID.
pub type ConversationId = u64;

/// Server-assigned message ID.
pub type MessageId = u64;

/// Server-assigned user ID.
pub type UserId = u64;

/// Opaque value matching a pending send to its later confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(pub u64);

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tok-{:016x}", self.0)
    }
}

/// Message author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// User ID. `None` for the local user when their ID is not known.
    pub id: Option<UserId>,
    /// Name to render.
    pub display_name: String,
    /// Message was written by the local user.
    pub is_self: bool,
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent locally, not yet confirmed by the server.
    Pending {
        /// Token generated at send time.
        token: CorrelationToken,
    },
    /// Confirmed by the server (push or history).
    Confirmed,
}

/// A message in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned ID. `None` exactly while pending.
    pub id: Option<MessageId>,
    /// Message text.
    pub content: String,
    /// Author.
    pub sender: Sender,
    /// Server timestamp, or local submit time while pending.
    pub timestamp: DateTime<Utc>,
    /// Delivery state.
    pub delivery: Delivery,
}

impl Message {
    /// Optimistic message for a local send.
    pub fn pending(
        token: CorrelationToken,
        content: String,
        sender: Sender,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self { id: None, content, sender, timestamp, delivery: Delivery::Pending { token } }
    }

    /// Token of a pending message. `None` once confirmed.
    pub fn token(&self) -> Option<CorrelationToken> {
        match self.delivery {
            Delivery::Pending { token } => Some(token),
            Delivery::Confirmed => None,
        }
    }

    /// Message is awaiting confirmation.
    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, Delivery::Pending { .. })
    }
}

/// Identity of the local user.
///
/// The server does not always flag the requesting user's messages, so the
/// client also matches on ID and, when the ID is unknown, on username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser {
    /// Local user's ID, if known.
    pub id: Option<UserId>,
    /// Local user's username, if known.
    pub username: Option<String>,
}

impl CurrentUser {
    /// Create an identity from a known ID and username.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self { id: Some(id), username: Some(username.into()) }
    }

    /// Whether a wire sender is the local user.
    pub fn is_sender(&self, sender: &WireSender) -> bool {
        if let Some(flag) = sender.is_current_user {
            return flag;
        }
        match (self.id, &self.username) {
            (Some(id), _) => id == sender.id,
            (None, Some(username)) => !username.is_empty() && *username == sender.username,
            (None, None) => false,
        }
    }

    /// Sender descriptor for optimistic messages.
    pub fn as_sender(&self) -> Sender {
        let display_name = self.username.clone().unwrap_or_else(|| "You".to_string());
        Sender { id: self.id, display_name, is_self: true }
    }

    /// Convert a wire sender.
    pub fn sender_from_wire(&self, sender: &WireSender) -> Sender {
        Sender {
            id: Some(sender.id),
            display_name: sender.username.clone(),
            is_self: self.is_sender(sender),
        }
    }

    /// Convert a confirmed wire message.
    pub fn message_from_wire(&self, message: WireMessage) -> Message {
        let sender = self.sender_from_wire(&message.sender);
        Message {
            id: Some(message.id),
            content: message.content,
            sender,
            timestamp: message.timestamp,
            delivery: Delivery::Confirmed,
        }
    }
}

/// Conversation metadata.
///
/// Unread counts are owned by [`crate::UnreadTracker`]; message logs by the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Conversation ID.
    pub id: ConversationId,
    /// Title as sent by the server. May be empty.
    pub title: String,
    /// Participants in server order.
    pub participants: Vec<Sender>,
    /// Most recent message.
    pub last_message: Option<Message>,
}

impl Conversation {
    /// Placeholder for a conversation seen before its metadata.
    pub fn placeholder(id: ConversationId) -> Self {
        Self { id, title: String::new(), participants: Vec::new(), last_message: None }
    }

    /// Convert a list entry.
    pub fn from_summary(summary: ChatSummary, user: &CurrentUser) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            participants: summary.participants.iter().map(|p| user.sender_from_wire(p)).collect(),
            last_message: summary.last_message.map(|m| user.message_from_wire(m)),
        }
    }

    /// Title to render, falling back to the ID.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() { format!("Chat #{}", self.id) } else { self.title.clone() }
    }

    /// Replace `last_message` if `message` is at least as recent.
    pub fn observe_message(&mut self, message: &Message) {
        let newer = self.last_message.as_ref().is_none_or(|last| message.timestamp >= last.timestamp);
        if newer {
            self.last_message = Some(message.clone());
        }
    }
}

/// Ordered message log of one conversation.
///
/// # Invariants
///
/// - Messages are ordered by timestamp; equal timestamps keep arrival order.
/// - No two messages share an ID.
/// - No two pending messages share a token.
///
/// The log itself only maintains ordering on insert; uniqueness is enforced
/// by [`crate::MessageReconciler`], the only writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every message with a timestamp `<=` the new one.
    ///
    /// Returns the insertion index.
    pub fn insert(&mut self, message: Message) -> usize {
        let index = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(index, message);
        index
    }

    /// Replace the message at `index` in place.
    pub(crate) fn replace(&mut self, index: usize, message: Message) {
        if let Some(slot) = self.messages.get_mut(index) {
            *slot = message;
        }
    }

    /// Remove and return the message at `index`.
    pub(crate) fn remove(&mut self, index: usize) -> Option<Message> {
        (index < self.messages.len()).then(|| self.messages.remove(index))
    }

    /// Index of the message with this server ID.
    pub fn position_of_id(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == Some(id))
    }

    /// Index of the pending message with this token.
    pub fn position_of_token(&self, token: CorrelationToken) -> Option<usize> {
        self.messages.iter().position(|m| m.token() == Some(token))
    }

    /// Log contains a message with this server ID.
    pub fn contains_id(&self, id: MessageId) -> bool {
        self.position_of_id(id).is_some()
    }

    /// Messages in order.
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate messages in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Log has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
