//! Request/response loading of the conversation list and message history.
//!
//! The loader performs no I/O. `begin_*` hands out a ticket describing the
//! request; the driver executes it and the result comes back through
//! `finish_*` together with the ticket. Every ticket carries a request ID from
//! a monotonically increasing counter, and only the latest ticket per target
//! is accepted. Anything older, or cancelled, is stale and discarded.

use std::collections::HashMap;

use chatline_proto::{ChatDetail, ChatList, ChatSummary, rest};
use serde_json::Value;

use crate::{error::TransportError, model::ConversationId};

/// Ticket for a conversation list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListTicket {
    /// Request counter value.
    pub request_id: u64,
}

/// Ticket for one conversation's history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryTicket {
    /// Request counter value.
    pub request_id: u64,
    /// Conversation whose history is requested.
    pub conversation_id: ConversationId,
}

/// A REST request for the driver to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchRequest {
    /// `GET chat/chats/`
    Conversations(ListTicket),
    /// `GET chat/chats/{id}/`
    History(HistoryTicket),
}

impl FetchRequest {
    /// Path relative to the API base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Conversations(_) => rest::CHATS_PATH.to_string(),
            Self::History(ticket) => rest::chat_path(ticket.conversation_id),
        }
    }

    /// Request counter value.
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Conversations(ticket) => ticket.request_id,
            Self::History(ticket) => ticket.request_id,
        }
    }
}

/// Completed REST request, as reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// The request this answers.
    pub request: FetchRequest,
    /// Decoded JSON body, or the transport failure. A bodiless success is
    /// `Value::Null`.
    pub result: Result<Value, TransportError>,
}

/// Decoded conversation list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPage {
    /// Conversations in server order.
    pub summaries: Vec<ChatSummary>,
    /// No further pages exist. An incomplete page says nothing about the
    /// conversations it does not list.
    pub complete: bool,
}

/// Tracks in-flight REST requests and suppresses stale responses.
#[derive(Debug, Clone, Default)]
pub struct HistoryLoader {
    next_request: u64,
    list_in_flight: Option<u64>,
    history_in_flight: HashMap<ConversationId, u64>,
}

impl HistoryLoader {
    /// Loader with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start loading the conversation list. Supersedes any list request
    /// still in flight.
    pub fn begin_conversations(&mut self) -> ListTicket {
        let request_id = self.allocate();
        self.list_in_flight = Some(request_id);
        ListTicket { request_id }
    }

    /// Start loading the history of `conversation_id`. Supersedes any
    /// request for the same conversation still in flight; requests for other
    /// conversations are unaffected.
    pub fn begin_history(&mut self, conversation_id: ConversationId) -> HistoryTicket {
        let request_id = self.allocate();
        self.history_in_flight.insert(conversation_id, request_id);
        HistoryTicket { request_id, conversation_id }
    }

    /// Discard whatever history request for `conversation_id` is in flight.
    ///
    /// Returns true if one was.
    pub fn cancel(&mut self, conversation_id: ConversationId) -> bool {
        self.history_in_flight.remove(&conversation_id).is_some()
    }

    /// A history request for `conversation_id` is in flight.
    pub fn is_loading(&self, conversation_id: ConversationId) -> bool {
        self.history_in_flight.contains_key(&conversation_id)
    }

    /// A conversation list request is in flight.
    pub fn is_loading_conversations(&self) -> bool {
        self.list_in_flight.is_some()
    }

    /// Accept a conversation list response.
    ///
    /// Returns `None` if the ticket is stale.
    pub fn finish_conversations(
        &mut self,
        ticket: ListTicket,
        result: Result<Value, TransportError>,
    ) -> Option<Result<ConversationPage, TransportError>> {
        if self.list_in_flight != Some(ticket.request_id) {
            tracing::debug!(request_id = ticket.request_id, "discarding stale conversation list");
            return None;
        }
        self.list_in_flight = None;

        let decoded = result.and_then(|body| {
            let list = ChatList::from_value(body)?;
            let complete = list.next_page().is_none();
            if let Some(next) = list.next_page() {
                tracing::debug!(next, "conversation list is paginated, using first page");
            }
            Ok(ConversationPage { summaries: list.into_results(), complete })
        });
        Some(decoded)
    }

    /// Accept a history response.
    ///
    /// Returns `None` if the ticket is stale or was cancelled.
    pub fn finish_history(
        &mut self,
        ticket: HistoryTicket,
        result: Result<Value, TransportError>,
    ) -> Option<Result<ChatDetail, TransportError>> {
        let conversation_id = ticket.conversation_id;
        if self.history_in_flight.get(&conversation_id) != Some(&ticket.request_id) {
            tracing::debug!(
                conversation_id,
                request_id = ticket.request_id,
                "discarding stale history"
            );
            return None;
        }
        self.history_in_flight.remove(&conversation_id);

        let decoded = result.and_then(|body| {
            let detail = ChatDetail::from_value(body)?;
            if detail.summary.id != conversation_id {
                return Err(TransportError::Decode(format!(
                    "history for chat {} answered with chat {}",
                    conversation_id, detail.summary.id
                )));
            }
            Ok(detail)
        });
        Some(decoded)
    }

    fn allocate(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }
}
