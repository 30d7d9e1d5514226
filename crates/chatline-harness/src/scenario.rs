//! Wire fixtures for scripted scenarios.
//!
//! Builders for the JSON the server would send, so tests read as
//! conversations rather than as hand-written JSON.

use chatline_proto::{ChatMessageFrame, PushFrame, WireMessage, WireSender};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};

use crate::SimEnv;

/// Wall-clock time `secs` after the simulation epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    SimEnv::epoch() + TimeDelta::seconds(secs)
}

/// A message from user `sender_id` named `u<sender_id>`.
pub fn message(id: u64, sender_id: u64, content: &str, secs: i64) -> WireMessage {
    WireMessage {
        id,
        content: content.to_string(),
        sender: WireSender { id: sender_id, username: format!("u{sender_id}"), is_current_user: None },
        timestamp: at(secs),
    }
}

/// One entry of the conversation list.
pub fn summary(id: u64, title: &str, unread: u32) -> Value {
    json!({
        "id": id,
        "title": title,
        "unread_count": unread,
        "last_message": null,
        "participants": [],
    })
}

/// Conversation detail with its history.
pub fn detail(id: u64, title: &str, messages: &[WireMessage]) -> Value {
    json!({
        "id": id,
        "title": title,
        "unread_count": 0,
        "participants": [],
        "messages": messages,
    })
}

/// Paginated envelope around `results`.
pub fn paginated(results: Vec<Value>) -> Value {
    json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results,
    })
}

/// Push frame text for a new message.
pub fn push_text(chat_id: u64, message: WireMessage) -> String {
    let sender = Some(message.sender.username.clone());
    let frame = PushFrame::ChatMessage(ChatMessageFrame { chat_id, message, sender });
    frame.encode().unwrap_or_default()
}
