//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use chatline_core::{ConversationId, ConversationStore, Environment, Message, StoreSnapshot};

/// Snapshot of the whole store.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Active conversation.
    pub active: Option<ConversationId>,
    /// Conversations in list order.
    pub conversations: Vec<ConversationSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture every conversation and log of a live store.
    pub fn from_store<E: Environment>(store: &ConversationStore<E>) -> Self {
        let conversations = store
            .conversation_ids()
            .iter()
            .map(|&id| ConversationSnapshot {
                id,
                unread: store.unread(id),
                messages: store.messages(id).map(<[Message]>::to_vec).unwrap_or_default(),
            })
            .collect();

        Self { active: store.active(), conversations }
    }

    /// Capture what a published snapshot shows. Only the active conversation
    /// carries messages.
    pub fn from_published(snapshot: &StoreSnapshot) -> Self {
        let conversations = snapshot
            .conversations
            .iter()
            .map(|view| ConversationSnapshot {
                id: view.id,
                unread: view.unread,
                messages: if snapshot.active == Some(view.id) {
                    snapshot.messages.clone()
                } else {
                    Vec::new()
                },
            })
            .collect();

        Self { active: snapshot.active, conversations }
    }

    /// Conversation by ID.
    pub fn conversation(&self, id: ConversationId) -> Option<&ConversationSnapshot> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Add a conversation.
    #[must_use]
    pub fn with_conversation(mut self, conversation: ConversationSnapshot) -> Self {
        self.conversations.push(conversation);
        self
    }

    /// Set the active conversation.
    #[must_use]
    pub fn with_active(mut self, active: Option<ConversationId>) -> Self {
        self.active = active;
        self
    }
}

/// Snapshot of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    /// Conversation ID.
    pub id: ConversationId,
    /// Unread count.
    pub unread: u32,
    /// Log in order.
    pub messages: Vec<Message>,
}

impl ConversationSnapshot {
    /// Conversation with no messages.
    pub fn new(id: ConversationId) -> Self {
        Self { id, ..Default::default() }
    }

    /// Set the unread count.
    #[must_use]
    pub fn with_unread(mut self, unread: u32) -> Self {
        self.unread = unread;
        self
    }

    /// Set the log.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_builder() {
        let snapshot = SystemSnapshot::empty()
            .with_conversation(ConversationSnapshot::new(1).with_unread(2))
            .with_active(Some(1));

        assert_eq!(snapshot.active, Some(1));
        assert_eq!(snapshot.conversation(1).map(|c| c.unread), Some(2));
        assert!(snapshot.conversation(2).is_none());
    }
}
