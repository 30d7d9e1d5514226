//! Per-conversation unread counts.
//!
//! # Invariants
//!
//! - The active conversation's count is always zero.
//! - Counts grow through [`UnreadTracker::on_delivery`] and server seeds, and
//!   only decrease through [`UnreadTracker::mark_active`].

use std::collections::HashMap;

use chatline_proto::Command;

use crate::model::ConversationId;

/// Unread counters plus the identity of the active conversation.
#[derive(Debug, Clone, Default)]
pub struct UnreadTracker {
    counts: HashMap<ConversationId, u32>,
    active: Option<ConversationId>,
}

impl UnreadTracker {
    /// Tracker with no active conversation and all counts zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` the active conversation and reset its count.
    ///
    /// Returns the `mark_as_read` command to send to the server. The caller
    /// sends it once per open.
    pub fn mark_active(&mut self, id: ConversationId) -> Command {
        self.active = Some(id);
        self.counts.insert(id, 0);
        Command::MarkAsRead { chat_id: id }
    }

    /// Clear the active conversation.
    pub fn clear_active(&mut self) {
        self.active = None;
    }

    /// A confirmed message from another user arrived in `id`.
    pub fn on_delivery(&mut self, id: ConversationId) {
        if self.active == Some(id) {
            return;
        }
        let count = self.counts.entry(id).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Take a count reported by the server. Ignored for the active
    /// conversation.
    ///
    /// Never lowers a local count: the server's figure may predate
    /// deliveries that arrived while the list request was in flight.
    pub fn seed(&mut self, id: ConversationId, count: u32) {
        if self.active == Some(id) {
            self.counts.insert(id, 0);
            return;
        }
        let local = self.counts.entry(id).or_insert(0);
        *local = (*local).max(count);
    }

    /// Drop the counter of a conversation that no longer exists.
    pub fn forget(&mut self, id: ConversationId) {
        self.counts.remove(&id);
        if self.active == Some(id) {
            self.active = None;
        }
    }

    /// Unread count of `id`.
    pub fn count(&self, id: ConversationId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// Sum over all conversations.
    pub fn total(&self) -> u32 {
        self.counts.values().fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    /// Active conversation.
    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }
}
