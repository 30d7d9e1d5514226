//! REST response types.
//!
//! The conversation list endpoint answers either with a bare array or with a
//! paginated envelope (`{count, next, previous, results}`) depending on server
//! configuration, with no discriminator. [`ChatList`] accepts both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Path of the conversation list, relative to the API base.
pub const CHATS_PATH: &str = "chat/chats/";

/// Path of one conversation's detail (including its messages).
pub fn chat_path(chat_id: u64) -> String {
    format!("{CHATS_PATH}{chat_id}/")
}

/// Message author as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSender {
    /// User ID.
    pub id: u64,
    /// Display name. Empty if the server omitted it.
    #[serde(default)]
    pub username: String,
    /// Server-side flag marking the requesting user. Often absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current_user: Option<bool>,
}

/// Confirmed message as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Server-assigned message ID.
    pub id: u64,
    /// Message text.
    pub content: String,
    /// Author.
    pub sender: WireSender,
    /// Server timestamp (RFC 3339).
    pub timestamp: DateTime<Utc>,
}

/// Conversation summary from `GET chat/chats/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Conversation ID.
    pub id: u64,
    /// Conversation title.
    #[serde(default)]
    pub title: String,
    /// Unread messages for the requesting user.
    #[serde(default)]
    pub unread_count: u32,
    /// Most recent message, if any.
    #[serde(default)]
    pub last_message: Option<WireMessage>,
    /// Participants in display order.
    #[serde(default)]
    pub participants: Vec<WireSender>,
}

/// Conversation detail from `GET chat/chats/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub summary: ChatSummary,
    /// Message history. Missing on the wire means empty.
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

impl ChatDetail {
    /// Decode a detail response body.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Paginated envelope around a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total number of results across all pages.
    #[serde(default)]
    pub count: Option<u64>,
    /// URL of the next page.
    #[serde(default)]
    pub next: Option<String>,
    /// URL of the previous page.
    #[serde(default)]
    pub previous: Option<String>,
    /// Results on this page.
    pub results: Vec<T>,
}

/// Body of the conversation list endpoint in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatList {
    /// Bare JSON array.
    Plain(Vec<ChatSummary>),
    /// Paginated envelope.
    Paginated(Page<ChatSummary>),
}

impl ChatList {
    /// Decode a list response body.
    ///
    /// A `null` body (204 No Content) decodes as an empty list.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::Plain(Vec::new()));
        }
        serde_json::from_value(value).map_err(|e| {
            ProtocolError::Malformed(format!("unexpected conversation list shape: {e}"))
        })
    }

    /// Conversation summaries regardless of envelope.
    pub fn into_results(self) -> Vec<ChatSummary> {
        match self {
            Self::Plain(results) | Self::Paginated(Page { results, .. }) => results,
        }
    }

    /// URL of the next page when the server paginated the list.
    pub fn next_page(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Paginated(page) => page.next.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn summary(id: u64) -> Value {
        json!({ "id": id, "title": "Team", "unread_count": 2, "last_message": null, "participants": [] })
    }

    #[test]
    fn list_accepts_bare_array() {
        let list = ChatList::from_value(json!([summary(1), summary(2)])).unwrap();
        assert!(list.next_page().is_none());
        let ids: Vec<_> = list.into_results().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn list_accepts_paginated_envelope() {
        let body = json!({
            "count": 3,
            "next": "http://host/api/chat/chats/?page=2",
            "previous": null,
            "results": [summary(7)],
        });
        let list = ChatList::from_value(body).unwrap();
        assert_eq!(list.next_page(), Some("http://host/api/chat/chats/?page=2"));
        assert_eq!(list.into_results()[0].id, 7);
    }

    #[test]
    fn list_rejects_other_shapes() {
        assert!(ChatList::from_value(json!({ "chats": [] })).is_err());
        assert!(ChatList::from_value(json!("nope")).is_err());
    }

    #[test]
    fn null_list_is_empty() {
        assert!(ChatList::from_value(Value::Null).unwrap().into_results().is_empty());
    }

    #[test]
    fn summary_defaults_optional_fields() {
        let list = ChatList::from_value(json!([{ "id": 4 }])).unwrap();
        let chat = &list.into_results()[0];
        assert_eq!(chat.title, "");
        assert_eq!(chat.unread_count, 0);
        assert!(chat.last_message.is_none());
        assert!(chat.participants.is_empty());
    }

    #[test]
    fn detail_without_messages_is_empty_history() {
        let detail = ChatDetail::from_value(json!({ "id": 1, "title": "Team" })).unwrap();
        assert_eq!(detail.summary.id, 1);
        assert!(detail.messages.is_empty());
    }

    #[test]
    fn detail_parses_messages() {
        let detail = ChatDetail::from_value(json!({
            "id": 1,
            "title": "Team",
            "messages": [{
                "id": 55,
                "content": "hi",
                "sender": { "id": 9, "username": "me" },
                "timestamp": "2024-05-01T10:00:00.123456+00:00",
            }],
        }))
        .unwrap();
        let message = &detail.messages[0];
        assert_eq!(message.id, 55);
        assert_eq!(message.sender.username, "me");
        assert_eq!(message.sender.is_current_user, None);
    }

    #[test]
    fn chat_path_has_trailing_slash() {
        assert_eq!(chat_path(12), "chat/chats/12/");
    }
}
