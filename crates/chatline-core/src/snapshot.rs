//! Read-only view of the store.
//!
//! A [`StoreSnapshot`] is the view model handed to the UI: the conversation
//! list with unread counts joined in, the active conversation's log, and the
//! status needed to render connection and error indicators. Snapshots are
//! plain values; the runtime shares them behind an `Arc`.

use crate::{
    connection::ConnectionState,
    error::StoreError,
    model::{ConversationId, Message, Sender},
};

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    /// Conversation ID.
    pub id: ConversationId,
    /// Title to render (never empty).
    pub title: String,
    /// Participants in server order.
    pub participants: Vec<Sender>,
    /// Most recent confirmed message.
    pub last_message: Option<Message>,
    /// Unread messages. Always 0 for the active conversation.
    pub unread: u32,
}

/// Consistent view of the store at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Conversations in server order.
    pub conversations: Vec<ConversationView>,
    /// Open conversation.
    pub active: Option<ConversationId>,
    /// Log of the open conversation, pending entries included.
    pub messages: Vec<Message>,
    /// Push channel state. Sending is disabled unless Connected.
    pub connection: ConnectionState,
    /// History of the open conversation is being fetched.
    pub loading_history: bool,
    /// Conversation list is being fetched.
    pub loading_conversations: bool,
    /// Most recent load failure, cleared by the next successful load.
    pub last_error: Option<String>,
    /// Why the last send was rejected, cleared by the next accepted send.
    pub send_error: Option<StoreError>,
}

impl StoreSnapshot {
    /// Snapshot of a store that has loaded nothing.
    pub fn empty() -> Self {
        Self {
            conversations: Vec::new(),
            active: None,
            messages: Vec::new(),
            connection: ConnectionState::Disconnected,
            loading_history: false,
            loading_conversations: false,
            last_error: None,
            send_error: None,
        }
    }

    /// Row for `id`.
    pub fn conversation(&self, id: ConversationId) -> Option<&ConversationView> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Unread count for `id`; 0 if unknown.
    pub fn unread(&self, id: ConversationId) -> u32 {
        self.conversation(id).map_or(0, |c| c.unread)
    }

    /// Messages of the open conversation that await confirmation.
    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_pending())
    }

    /// Sending is currently possible.
    pub fn can_send(&self) -> bool {
        self.active.is_some() && self.connection.is_connected()
    }
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
