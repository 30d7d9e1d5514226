//! Wire protocol for chatline.
//!
//! Two surfaces share these types:
//!
//! - The REST API (`chat/chats/` and `chat/chats/{id}/`) used for the initial
//!   conversation list and per-conversation history. See [`rest`].
//! - The push channel: a single JSON-framed WebSocket carrying inbound
//!   [`PushFrame`]s and outbound [`Command`]s.
//!
//! Decoding happens once at the boundary. Everything past this crate works
//! with typed values; malformed input surfaces as [`ProtocolError`] and never
//! as a panic.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod errors;
pub mod frame;
pub mod rest;

pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use frame::{ChatMessageFrame, PushFrame};
pub use rest::{ChatDetail, ChatList, ChatSummary, WireMessage, WireSender};
