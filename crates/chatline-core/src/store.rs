//! Conversation store.
//!
//! The store is the authoritative in-memory aggregate: conversation metadata
//! plus one [`MessageLog`] per conversation. It is the only component the UI
//! reads from or dispatches through. Like the other state machines it does
//! no I/O; operations return [`StoreAction`]s for the runtime to execute and
//! results come back as [`StoreEvent`]s.
//!
//! # Writers
//!
//! Logs are written only by the [`MessageReconciler`] and metadata only by
//! [`HistoryLoader`] results and pushes. Readers get [`StoreSnapshot`] values.
//!
//! # Opening a conversation
//!
//! [`ConversationStore::open_conversation`] emits, in order: the history
//! fetch, the unread reset, and the `mark_as_read` command. Switching to
//! another conversation before the fetch resolves cancels it; its response is
//! then discarded by the loader.

use std::{collections::HashMap, time::Duration};

use chatline_proto::{ChatDetail, ChatMessageFrame, Command, PushFrame};

use crate::{
    connection::ConnectionState,
    env::Environment,
    error::{StoreError, TransportError},
    history::{ConversationPage, FetchRequest, FetchResponse, HistoryLoader},
    model::{Conversation, ConversationId, CorrelationToken, CurrentUser, Message, MessageLog},
    reconciler::{MessageReconciler, PushOutcome},
    snapshot::{ConversationView, StoreSnapshot},
    unread::UnreadTracker,
};

/// Time a send may stay unconfirmed before it is treated as failed.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Unconfirmed sends older than this are removed on tick.
    pub pending_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { pending_timeout: DEFAULT_PENDING_TIMEOUT }
    }
}

/// Inputs to the store.
///
/// Generic over `I` (Instant type) to support both production and
/// simulation environments.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<I = std::time::Instant> {
    /// A REST request completed.
    Fetched(FetchResponse),

    /// A frame arrived on the push channel.
    Push(PushFrame),

    /// The command carrying this send could not be delivered.
    SendFailed {
        /// Token returned by `send_message`.
        token: CorrelationToken,
    },

    /// Push channel state changed.
    ConnectionChanged(ConnectionState),

    /// Time tick for timeout processing.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Side effects requested by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Execute a REST request and report back with `StoreEvent::Fetched`.
    Fetch(FetchRequest),

    /// Send a command on the push channel.
    Dispatch {
        /// Command to send.
        command: Command,
        /// Set for `send_message`; report delivery failure with
        /// `StoreEvent::SendFailed`.
        token: Option<CorrelationToken>,
    },

    /// Visible state changed; publish a new snapshot.
    Publish,
}

#[derive(Debug, Clone)]
struct Entry {
    conversation: Conversation,
    log: MessageLog,
}

impl Entry {
    fn new(conversation: Conversation) -> Self {
        Self { conversation, log: MessageLog::new() }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSend<I> {
    conversation_id: ConversationId,
    sent_at: I,
}

/// The conversation store.
pub struct ConversationStore<E: Environment> {
    /// Environment for wall-clock time and randomness.
    env: E,

    /// Configuration.
    config: StoreConfig,

    /// Conversation IDs in server order.
    order: Vec<ConversationId>,

    /// Metadata and logs by ID.
    entries: HashMap<ConversationId, Entry>,

    /// Sole writer of message logs.
    reconciler: MessageReconciler,

    /// Unread counts and the active conversation.
    unread: UnreadTracker,

    /// In-flight REST requests.
    loader: HistoryLoader,

    /// Unconfirmed sends by token.
    pending_sends: HashMap<CorrelationToken, PendingSend<E::Instant>>,

    /// Last known push channel state.
    connection: ConnectionState,

    /// Channel has been Connected at least once.
    was_connected: bool,

    /// Most recent load failure.
    last_error: Option<String>,

    /// Why the last send was rejected, until the next accepted one.
    send_error: Option<StoreError>,
}

impl<E: Environment> ConversationStore<E> {
    /// Create an empty store for `current_user`.
    pub fn new(env: E, current_user: CurrentUser, config: StoreConfig) -> Self {
        let token_seed = env.random_u64();
        Self {
            env,
            config,
            order: Vec::new(),
            entries: HashMap::new(),
            reconciler: MessageReconciler::new(current_user, token_seed),
            unread: UnreadTracker::new(),
            loader: HistoryLoader::new(),
            pending_sends: HashMap::new(),
            connection: ConnectionState::Disconnected,
            was_connected: false,
            last_error: None,
            send_error: None,
        }
    }

    /// Conversation IDs in display order.
    pub fn conversation_ids(&self) -> &[ConversationId] {
        &self.order
    }

    /// Metadata of a conversation.
    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.entries.get(&id).map(|e| &e.conversation)
    }

    /// Log of a conversation.
    pub fn messages(&self, id: ConversationId) -> Option<&[Message]> {
        self.entries.get(&id).map(|e| e.log.as_slice())
    }

    /// Unread count of a conversation.
    pub fn unread(&self, id: ConversationId) -> u32 {
        self.unread.count(id)
    }

    /// Open conversation.
    pub fn active(&self) -> Option<ConversationId> {
        self.unread.active()
    }

    /// Last known push channel state.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Number of sends awaiting confirmation.
    pub fn pending_count(&self) -> usize {
        self.pending_sends.len()
    }

    /// Most recent load failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Why the most recent send was rejected.
    pub fn send_error(&self) -> Option<&StoreError> {
        self.send_error.as_ref()
    }

    /// Request the conversation list.
    pub fn load_conversations(&mut self) -> Vec<StoreAction> {
        let ticket = self.loader.begin_conversations();
        vec![StoreAction::Fetch(FetchRequest::Conversations(ticket)), StoreAction::Publish]
    }

    /// Make `id` the active conversation.
    ///
    /// Returns, in order: the history fetch, the `mark_as_read` dispatch, and
    /// a publish. A history fetch still in flight for the previously active
    /// conversation is cancelled.
    pub fn open_conversation(&mut self, id: ConversationId) -> Vec<StoreAction> {
        if let Some(previous) = self.unread.active()
            && previous != id
            && self.loader.cancel(previous)
        {
            tracing::debug!(previous, next = id, "cancelled history of previous conversation");
        }

        if !self.entries.contains_key(&id) {
            self.insert_placeholder(id);
        }

        self.send_error = None;
        let ticket = self.loader.begin_history(id);
        let command = self.unread.mark_active(id);
        tracing::debug!(conversation_id = id, request_id = ticket.request_id, "opening conversation");

        vec![
            StoreAction::Fetch(FetchRequest::History(ticket)),
            StoreAction::Dispatch { command, token: None },
            StoreAction::Publish,
        ]
    }

    /// Send `content` to the active conversation.
    ///
    /// Inserts a pending message immediately and returns its token together
    /// with the dispatch of the `send_message` command.
    ///
    /// # Errors
    ///
    /// - `StoreError::EmptyMessage` if `content` is blank
    /// - `StoreError::NoActiveConversation` if nothing is open
    /// - `StoreError::NotConnected` unless the channel is Connected
    ///
    /// The rejection is also kept in the snapshot until the next accepted
    /// send or conversation switch.
    pub fn send_message(
        &mut self,
        content: &str,
    ) -> Result<(CorrelationToken, Vec<StoreAction>), StoreError> {
        let result = self.try_send(content);
        self.send_error = result.as_ref().err().cloned();
        result
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: StoreEvent<E::Instant>) -> Vec<StoreAction> {
        match event {
            StoreEvent::Fetched(response) => self.handle_fetched(response),
            StoreEvent::Push(PushFrame::ChatMessage(frame)) => self.handle_chat_message(frame),
            StoreEvent::SendFailed { token } => self.handle_send_failed(token),
            StoreEvent::ConnectionChanged(state) => self.handle_connection_changed(state),
            StoreEvent::Tick { now } => self.handle_tick(now),
        }
    }

    /// Current read-only view.
    pub fn snapshot(&self) -> StoreSnapshot {
        let active = self.unread.active();

        let conversations = self
            .order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| ConversationView {
                id: entry.conversation.id,
                title: entry.conversation.display_title(),
                participants: entry.conversation.participants.clone(),
                last_message: entry.conversation.last_message.clone(),
                unread: self.unread.count(entry.conversation.id),
            })
            .collect();

        let messages = active
            .and_then(|id| self.entries.get(&id))
            .map(|entry| entry.log.as_slice().to_vec())
            .unwrap_or_default();

        StoreSnapshot {
            conversations,
            active,
            messages,
            connection: self.connection,
            loading_history: active.is_some_and(|id| self.loader.is_loading(id)),
            loading_conversations: self.loader.is_loading_conversations(),
            last_error: self.last_error.clone(),
            send_error: self.send_error.clone(),
        }
    }

    fn try_send(
        &mut self,
        content: &str,
    ) -> Result<(CorrelationToken, Vec<StoreAction>), StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyMessage);
        }

        let conversation_id = self.unread.active().ok_or(StoreError::NoActiveConversation)?;

        if !self.connection.is_connected() {
            return Err(StoreError::NotConnected { state: self.connection });
        }

        let now = self.env.wall_clock();
        let entry = self
            .entries
            .entry(conversation_id)
            .or_insert_with(|| Entry::new(Conversation::placeholder(conversation_id)));
        let token = self.reconciler.apply_local_send(&mut entry.log, content.to_string(), now);

        self.pending_sends.insert(token, PendingSend { conversation_id, sent_at: self.env.now() });

        let command = Command::SendMessage { chat_id: conversation_id, content: content.to_string() };
        Ok((token, vec![StoreAction::Dispatch { command, token: Some(token) }, StoreAction::Publish]))
    }

    fn handle_fetched(&mut self, response: FetchResponse) -> Vec<StoreAction> {
        match response.request {
            FetchRequest::Conversations(ticket) => {
                match self.loader.finish_conversations(ticket, response.result) {
                    Some(Ok(page)) => self.apply_conversations(page),
                    Some(Err(err)) => self.record_error("conversation list", &err),
                    None => vec![],
                }
            },
            FetchRequest::History(ticket) => {
                match self.loader.finish_history(ticket, response.result) {
                    Some(Ok(detail)) => self.apply_history(detail),
                    Some(Err(err)) => self.record_error("history", &err),
                    None => vec![],
                }
            },
        }
    }

    fn apply_conversations(&mut self, page: ConversationPage) -> Vec<StoreAction> {
        let active = self.unread.active();
        let mut order = Vec::with_capacity(page.summaries.len());

        for summary in page.summaries {
            let id = summary.id;
            let unread = summary.unread_count;
            let conversation = Conversation::from_summary(summary, self.reconciler.current_user());

            match self.entries.get_mut(&id) {
                Some(entry) => {
                    let mut conversation = conversation;
                    if let Some(latest) = latest_confirmed(&entry.log) {
                        conversation.observe_message(latest);
                    }
                    entry.conversation = conversation;
                },
                None => {
                    self.entries.insert(id, Entry::new(conversation));
                },
            }

            self.unread.seed(id, unread);
            if !order.contains(&id) {
                order.push(id);
            }
        }

        // Conversations beyond the first page are kept as they are.
        if !page.complete {
            let unlisted: Vec<ConversationId> =
                self.order.iter().copied().filter(|id| !order.contains(id)).collect();
            order.extend(unlisted);
        }

        // The open conversation stays even if the server no longer lists it.
        if let Some(active) = active
            && !order.contains(&active)
            && self.entries.contains_key(&active)
        {
            order.push(active);
        }

        let dropped: Vec<ConversationId> =
            self.entries.keys().copied().filter(|id| !order.contains(id)).collect();
        for id in dropped {
            tracing::debug!(conversation_id = id, "conversation no longer listed");
            self.entries.remove(&id);
            self.unread.forget(id);
            self.loader.cancel(id);
            self.pending_sends.retain(|_, pending| pending.conversation_id != id);
        }

        tracing::debug!(count = order.len(), "conversation list loaded");
        self.order = order;
        self.last_error = None;

        vec![StoreAction::Publish]
    }

    fn apply_history(&mut self, detail: ChatDetail) -> Vec<StoreAction> {
        let id = detail.summary.id;
        if !self.entries.contains_key(&id) {
            self.insert_placeholder(id);
        }
        let Some(entry) = self.entries.get_mut(&id) else {
            return vec![];
        };

        let user = self.reconciler.current_user();
        if !detail.summary.title.is_empty() {
            entry.conversation.title = detail.summary.title;
        }
        if !detail.summary.participants.is_empty() {
            entry.conversation.participants =
                detail.summary.participants.iter().map(|p| user.sender_from_wire(p)).collect();
        }

        let stats = self.reconciler.merge_history(&mut entry.log, detail.messages);
        if let Some(latest) = latest_confirmed(&entry.log) {
            entry.conversation.observe_message(latest);
        }

        let log = &entry.log;
        self.pending_sends.retain(|token, pending| {
            pending.conversation_id != id || log.position_of_token(*token).is_some()
        });

        tracing::debug!(
            conversation_id = id,
            inserted = stats.inserted,
            updated = stats.updated,
            confirmed = stats.confirmed,
            "history merged"
        );
        self.last_error = None;

        vec![StoreAction::Publish]
    }

    fn handle_chat_message(&mut self, frame: ChatMessageFrame) -> Vec<StoreAction> {
        let mut actions = Vec::new();
        let id = frame.chat_id;
        let message_id = frame.message.id;

        if !self.entries.contains_key(&id) {
            tracing::debug!(conversation_id = id, "push for unknown conversation");
            self.insert_placeholder(id);
            if !self.loader.is_loading_conversations() {
                let ticket = self.loader.begin_conversations();
                actions.push(StoreAction::Fetch(FetchRequest::Conversations(ticket)));
            }
        }

        let Some(entry) = self.entries.get_mut(&id) else {
            return actions;
        };

        let outcome =
            self.reconciler.apply_push(&mut entry.log, &mut self.unread, id, frame.message);

        if let PushOutcome::Confirmed(token) = outcome {
            self.pending_sends.remove(&token);
        }

        if outcome.is_applied() {
            if let Some(index) = entry.log.position_of_id(message_id) {
                entry.conversation.observe_message(&entry.log.as_slice()[index]);
            }
            actions.push(StoreAction::Publish);
        } else {
            tracing::debug!(conversation_id = id, message_id, "duplicate push ignored");
        }

        actions
    }

    fn handle_send_failed(&mut self, token: CorrelationToken) -> Vec<StoreAction> {
        if self.fail_send(token) { vec![StoreAction::Publish] } else { vec![] }
    }

    fn handle_connection_changed(&mut self, state: ConnectionState) -> Vec<StoreAction> {
        let mut actions = Vec::new();
        let previous = self.connection;
        self.connection = state;

        if state.is_connected() && !previous.is_connected() {
            if self.was_connected
                && let Some(active) = self.unread.active()
            {
                tracing::info!(conversation_id = active, "resyncing history after reconnect");
                let ticket = self.loader.begin_history(active);
                actions.push(StoreAction::Fetch(FetchRequest::History(ticket)));
            }
            self.was_connected = true;
        }

        if previous != state {
            actions.push(StoreAction::Publish);
        }
        actions
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<StoreAction> {
        let timeout = self.config.pending_timeout;
        let expired: Vec<CorrelationToken> = self
            .pending_sends
            .iter()
            .filter(|(_, pending)| now - pending.sent_at >= timeout)
            .map(|(token, _)| *token)
            .collect();

        let mut changed = false;
        for token in expired {
            tracing::warn!(%token, "send not confirmed in time, discarding");
            changed |= self.fail_send(token);
        }

        if changed { vec![StoreAction::Publish] } else { vec![] }
    }

    fn fail_send(&mut self, token: CorrelationToken) -> bool {
        let Some(pending) = self.pending_sends.remove(&token) else {
            tracing::debug!(%token, "failure for send that is no longer pending");
            return false;
        };

        self.entries
            .get_mut(&pending.conversation_id)
            .and_then(|entry| self.reconciler.discard(&mut entry.log, token))
            .is_some()
    }

    fn record_error(&mut self, what: &str, err: &TransportError) -> Vec<StoreAction> {
        tracing::warn!(error = %err, "failed to load {what}");
        self.last_error = Some(err.to_string());
        vec![StoreAction::Publish]
    }

    fn insert_placeholder(&mut self, id: ConversationId) {
        self.entries.insert(id, Entry::new(Conversation::placeholder(id)));
        self.order.push(id);
    }
}

fn latest_confirmed(log: &MessageLog) -> Option<&Message> {
    log.iter().rev().find(|m| !m.is_pending())
}
