//! Error types for the synchronization core.
//!
//! Strongly-typed errors per component boundary. Network and protocol
//! failures are recovered where they occur and turned into these values or
//! into connection status; none of them is fatal to the store.

use chatline_proto::ProtocolError;
use thiserror::Error;

use crate::connection::ConnectionState;

/// A REST call failed.
///
/// The store leaves existing state unchanged and records the error for
/// display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Request never produced a response (DNS, TCP, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl TransportError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Errors from the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// A command was sent while the channel was not Connected.
    ///
    /// Non-fatal: whether to queue or drop is the caller's decision.
    #[error("not connected (state: {state:?})")]
    NotConnected {
        /// State at the time of the attempt.
        state: ConnectionState,
    },

    /// The command could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors returned by store commands issued from the UI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No conversation is open.
    #[error("no conversation is open")]
    NoActiveConversation,

    /// Message text was empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Sending is disabled until the channel reconnects.
    #[error("not connected (state: {state:?})")]
    NotConnected {
        /// Connection state known to the store.
        state: ConnectionState,
    },
}
