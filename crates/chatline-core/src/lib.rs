//! Core
//!
//! Sans-IO synchronization core for chatline. Keeps a set of conversations and
//! their message logs consistent across the initial list load, per-conversation
//! history fetches, and the live push channel, while reconciling optimistic
//! local sends with the copies the server later confirms.
//!
//! # Architecture
//!
//! Every component is a pure state machine. Methods take time as input and
//! return actions ([`ConnectionAction`], [`StoreAction`]) for a driver to
//! execute; results of those actions come back as events ([`StoreEvent`]).
//! Nothing in this crate touches a socket, a clock, or an RNG directly; the
//! [`Environment`] trait supplies time and randomness.
//!
//! # Components
//!
//! - [`ConnectionManager`]: push channel lifecycle with capped backoff
//! - [`HistoryLoader`]: REST request tracking with stale-response suppression
//! - [`MessageReconciler`]: merges pushes, history, and optimistic sends
//! - [`UnreadTracker`]: per-conversation unread counts
//! - [`ConversationStore`]: the aggregate the UI reads from and dispatches
//!   through

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod history;
pub mod model;
pub mod reconciler;
pub mod snapshot;
pub mod store;
pub mod unread;

pub use chatline_proto::{Command, PushFrame};
pub use connection::{
    BackoffConfig, ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState,
    SocketId,
};
pub use env::Environment;
pub use error::{ConnectionError, StoreError, TransportError};
pub use history::{
    ConversationPage, FetchRequest, FetchResponse, HistoryLoader, HistoryTicket, ListTicket,
};
pub use model::{
    Conversation, ConversationId, CorrelationToken, CurrentUser, Delivery, Message, MessageId,
    MessageLog, Sender, UserId,
};
pub use reconciler::{HISTORY_ECHO_SKEW_SECS, MergeStats, MessageReconciler, PushOutcome};
pub use snapshot::{ConversationView, StoreSnapshot};
pub use store::{ConversationStore, StoreAction, StoreConfig, StoreEvent};
pub use unread::UnreadTracker;
