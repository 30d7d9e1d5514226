//! Merging of optimistic sends, live pushes and fetched history.
//!
//! The reconciler is the only writer of message logs. Three sources feed it:
//!
//! - local sends, which insert a pending message tagged with a fresh
//!   [`CorrelationToken`]
//! - pushes from the channel, which append confirmed messages or confirm the
//!   pending entry they echo
//! - history fetches, which merge a full server log into the local one
//!
//! # Echo matching
//!
//! The push protocol does not carry the correlation token back, so a
//! self-authored confirmed message is matched to the earliest pending entry
//! with identical content. Pending entries are confirmed in send order, which
//! is the order the server receives them on a single channel.
//!
//! History may contain older self-authored messages with the same text as a
//! fresh send. A history message only confirms a pending entry sent no more
//! than [`HISTORY_ECHO_SKEW_SECS`] after it.
//!
//! # Invariants
//!
//! - A server ID appears at most once per log; re-delivery is a no-op.
//! - Confirming a pending entry never leaves both the pending and the
//!   confirmed copy in the log.

use chatline_proto::WireMessage;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    model::{ConversationId, CorrelationToken, CurrentUser, Message, MessageLog},
    unread::UnreadTracker,
};

/// Clock skew tolerated between a local send and its server timestamp when
/// a history merge confirms it.
pub const HISTORY_ECHO_SKEW_SECS: i64 = 60;

/// What a push did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// New message inserted.
    Appended,
    /// Message confirmed the pending entry with this token.
    Confirmed(CorrelationToken),
    /// ID already present; nothing changed.
    Duplicate,
}

impl PushOutcome {
    /// The log changed.
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

/// Counts from merging a history response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Messages not previously in the log.
    pub inserted: usize,
    /// Messages already present, refreshed from the server copy.
    pub updated: usize,
    /// Pending entries confirmed by the history.
    pub confirmed: usize,
}

/// Reconciles the three message sources into per-conversation logs.
#[derive(Debug, Clone)]
pub struct MessageReconciler {
    current_user: CurrentUser,
    next_token: u64,
}

impl MessageReconciler {
    /// Create a reconciler for `current_user`.
    ///
    /// Tokens are drawn from a counter starting at `token_seed`; seed it from
    /// environment randomness so tokens differ between runs.
    pub fn new(current_user: CurrentUser, token_seed: u64) -> Self {
        Self { current_user, next_token: token_seed }
    }

    /// Local user identity.
    pub fn current_user(&self) -> &CurrentUser {
        &self.current_user
    }

    /// Apply one pushed message to `log`.
    ///
    /// A message from another user that is newly inserted counts as one
    /// delivery for `conversation_id`; the tracker ignores it if that
    /// conversation is active.
    pub fn apply_push(
        &self,
        log: &mut MessageLog,
        unread: &mut UnreadTracker,
        conversation_id: ConversationId,
        message: WireMessage,
    ) -> PushOutcome {
        let message = self.current_user.message_from_wire(message);
        let is_self = message.sender.is_self;

        let outcome = self.merge_confirmed(log, message, false);
        if outcome == PushOutcome::Appended && !is_self {
            unread.on_delivery(conversation_id);
        }
        outcome
    }

    /// Insert a pending message for a local send.
    ///
    /// Returns the token that later confirms or discards it.
    pub fn apply_local_send(
        &mut self,
        log: &mut MessageLog,
        content: String,
        now: DateTime<Utc>,
    ) -> CorrelationToken {
        let token = CorrelationToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);

        log.insert(Message::pending(token, content, self.current_user.as_sender(), now));
        token
    }

    /// Replace the pending entry bearing `token` with its confirmed copy.
    ///
    /// The entry keeps its position unless the server timestamp would break
    /// the log's ordering, in which case it moves to where the timestamp
    /// belongs. If the confirmed ID is already in the log the pending entry
    /// is simply dropped. Returns false, leaving the log untouched, for an
    /// unknown token.
    pub fn reconcile_echo(
        &self,
        log: &mut MessageLog,
        token: CorrelationToken,
        confirmed: Message,
    ) -> bool {
        let Some(index) = log.position_of_token(token) else {
            tracing::warn!(%token, "echo for unknown correlation token");
            return false;
        };

        if confirmed.id.is_some_and(|id| log.contains_id(id)) {
            log.remove(index);
            return true;
        }

        replace_ordered(log, index, confirmed);
        true
    }

    /// Remove the pending entry bearing `token` after a failed send.
    pub fn discard(&self, log: &mut MessageLog, token: CorrelationToken) -> Option<Message> {
        let index = log.position_of_token(token)?;
        log.remove(index)
    }

    /// Merge a fetched history into `log`.
    ///
    /// Known IDs are refreshed in place, self-authored messages confirm
    /// matching pending entries, and everything else is inserted by
    /// timestamp. Pending entries without a match are kept.
    pub fn merge_history(&self, log: &mut MessageLog, messages: Vec<WireMessage>) -> MergeStats {
        let mut stats = MergeStats::default();

        for message in messages {
            let message = self.current_user.message_from_wire(message);
            match self.merge_confirmed(log, message, true) {
                PushOutcome::Appended => stats.inserted += 1,
                PushOutcome::Confirmed(_) => stats.confirmed += 1,
                PushOutcome::Duplicate => stats.updated += 1,
            }
        }

        stats
    }

    fn merge_confirmed(&self, log: &mut MessageLog, message: Message, refresh: bool) -> PushOutcome {
        if let Some(id) = message.id
            && let Some(index) = log.position_of_id(id)
        {
            if refresh {
                replace_ordered(log, index, message);
            }
            return PushOutcome::Duplicate;
        }

        // Pushes are always fresh; history can reach back past the send.
        let sent_by = refresh.then(|| message.timestamp + TimeDelta::seconds(HISTORY_ECHO_SKEW_SECS));

        if message.sender.is_self
            && let Some(token) = earliest_pending_with(log, &message.content, sent_by)
            && self.reconcile_echo(log, token, message.clone())
        {
            return PushOutcome::Confirmed(token);
        }

        log.insert(message);
        PushOutcome::Appended
    }
}

fn earliest_pending_with(
    log: &MessageLog,
    content: &str,
    sent_by: Option<DateTime<Utc>>,
) -> Option<CorrelationToken> {
    log.iter()
        .filter(|m| m.content == content && sent_by.is_none_or(|limit| m.timestamp <= limit))
        .find_map(Message::token)
}

/// Overwrite `index` if `message` still sorts there; otherwise move it.
fn replace_ordered(log: &mut MessageLog, index: usize, message: Message) {
    let slice = log.as_slice();
    let after_prev = index == 0 || slice[index - 1].timestamp <= message.timestamp;
    let before_next = slice.get(index + 1).is_none_or(|next| message.timestamp <= next.timestamp);

    if after_prev && before_next {
        log.replace(index, message);
    } else {
        log.remove(index);
        log.insert(message);
    }
}
