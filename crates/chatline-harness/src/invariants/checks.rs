//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantKind, InvariantResult, SystemSnapshot, Violation};

/// Every log is non-decreasing by timestamp.
pub struct LogOrdered;

impl Invariant for LogOrdered {
    fn kind(&self) -> InvariantKind {
        InvariantKind::LogOrdered
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for conversation in &state.conversations {
            for (i, window) in conversation.messages.windows(2).enumerate() {
                if window[1].timestamp < window[0].timestamp {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "conversation {}: message {} at {} precedes message {} at {}",
                            conversation.id,
                            i,
                            window[0].timestamp,
                            i + 1,
                            window[1].timestamp
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// No server ID appears twice in one log.
///
/// A duplicate means a push or history entry was applied twice, or an echo
/// was appended next to its pending entry instead of replacing it.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn kind(&self) -> InvariantKind {
        InvariantKind::UniqueMessageIds
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for conversation in &state.conversations {
            let mut seen = HashSet::new();
            for id in conversation.messages.iter().filter_map(|m| m.id) {
                if !seen.insert(id) {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "conversation {}: message id {} appears twice",
                            conversation.id, id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The active conversation never shows unread messages.
pub struct ActiveUnreadZero;

impl Invariant for ActiveUnreadZero {
    fn kind(&self) -> InvariantKind {
        InvariantKind::ActiveUnreadZero
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(active) = state.active else {
            return Ok(());
        };

        match state.conversation(active) {
            Some(conversation) if conversation.unread != 0 => Err(Violation {
                invariant: self.kind(),
                message: format!(
                    "active conversation {} has unread {}",
                    active, conversation.unread
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Pending entries have no ID and unique tokens; confirmed entries have an
/// ID.
pub struct PendingWellFormed;

impl Invariant for PendingWellFormed {
    fn kind(&self) -> InvariantKind {
        InvariantKind::PendingWellFormed
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for conversation in &state.conversations {
            let mut tokens = HashSet::new();
            for message in &conversation.messages {
                let problem = match (message.token(), message.id) {
                    (Some(token), None) if !tokens.insert(token) => {
                        Some(format!("token {token} appears twice"))
                    },
                    (Some(token), Some(id)) => Some(format!("pending {token} carries id {id}")),
                    (None, None) => Some(format!("confirmed message {:?} has no id", message.content)),
                    _ => None,
                };

                if let Some(problem) = problem {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!("conversation {}: {problem}", conversation.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The active conversation must be in the conversation list.
///
/// This prevents the UI from showing a selected conversation that doesn't
/// exist.
pub struct ActiveConversationListed;

impl Invariant for ActiveConversationListed {
    fn kind(&self) -> InvariantKind {
        InvariantKind::ActiveConversationListed
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if let Some(active) = state.active
            && state.conversation(active).is_none()
        {
            return Err(Violation {
                invariant: self.kind(),
                message: format!(
                    "active conversation {} not in {:?}",
                    active,
                    state.conversations.iter().map(|c| c.id).collect::<Vec<_>>()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chatline_core::{CorrelationToken, Delivery, Message, Sender};
    use chrono::{DateTime, TimeDelta, Utc};

    use super::*;
    use crate::invariants::ConversationSnapshot;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    fn sender() -> Sender {
        Sender { id: Some(1), display_name: "a".into(), is_self: false }
    }

    fn confirmed(id: u64, secs: i64) -> Message {
        Message {
            id: Some(id),
            content: format!("m{id}"),
            sender: sender(),
            timestamp: at(secs),
            delivery: Delivery::Confirmed,
        }
    }

    fn pending(token: u64, secs: i64) -> Message {
        Message::pending(CorrelationToken(token), "p".into(), sender(), at(secs))
    }

    fn with_log(messages: Vec<Message>) -> SystemSnapshot {
        SystemSnapshot::empty().with_conversation(ConversationSnapshot::new(1).with_messages(messages))
    }

    #[test]
    fn log_ordered_detects_inversion() {
        assert!(LogOrdered.check(&with_log(vec![confirmed(1, 0), confirmed(2, 0)])).is_ok());
        assert!(LogOrdered.check(&with_log(vec![confirmed(1, 5), confirmed(2, 1)])).is_err());
    }

    #[test]
    fn unique_ids_detects_duplicate() {
        assert!(UniqueMessageIds.check(&with_log(vec![confirmed(1, 0), pending(1, 1)])).is_ok());
        assert!(UniqueMessageIds.check(&with_log(vec![confirmed(1, 0), confirmed(1, 1)])).is_err());
    }

    #[test]
    fn active_unread_zero() {
        let ok = SystemSnapshot::empty()
            .with_conversation(ConversationSnapshot::new(1))
            .with_conversation(ConversationSnapshot::new(2).with_unread(4))
            .with_active(Some(1));
        assert!(ActiveUnreadZero.check(&ok).is_ok());

        let bad = ok.with_active(Some(2));
        let err = ActiveUnreadZero.check(&bad).unwrap_err();
        assert_eq!(err.invariant, InvariantKind::ActiveUnreadZero);
    }

    #[test]
    fn pending_well_formed() {
        assert!(PendingWellFormed.check(&with_log(vec![pending(1, 0), pending(2, 0)])).is_ok());
        assert!(PendingWellFormed.check(&with_log(vec![pending(1, 0), pending(1, 0)])).is_err());

        let mut no_id = confirmed(1, 0);
        no_id.id = None;
        assert!(PendingWellFormed.check(&with_log(vec![no_id])).is_err());
    }

    #[test]
    fn active_must_be_listed() {
        let snapshot = SystemSnapshot::empty().with_active(Some(9));
        assert!(ActiveConversationListed.check(&snapshot).is_err());
    }
}
