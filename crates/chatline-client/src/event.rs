//! Runtime input events.

use chatline_core::{ConversationId, FetchResponse, SocketId};

/// Intents from the hosting UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Refresh the conversation list.
    LoadConversations,
    /// Open a conversation.
    Open(ConversationId),
    /// Send a message to the open conversation.
    Send(String),
    /// Connect the push channel (retry after `Failed`).
    Reconnect,
    /// Tear the push channel down.
    Disconnect,
    /// Stop the runtime.
    Quit,
}

/// Everything the driver can report to the runtime.
///
/// The driver is responsible for:
/// - Forwarding UI intents
/// - Reporting socket lifecycle and inbound text, tagged with the socket ID
/// - Completing REST requests
/// - Driving time forward via ticks
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// UI intent.
    Ui(UiCommand),

    /// Socket finished opening.
    SocketOpened(SocketId),

    /// Text frame received.
    SocketText {
        /// Receiving socket.
        socket: SocketId,
        /// Frame payload.
        text: String,
    },

    /// Socket closed or failed.
    SocketClosed {
        /// Closed socket.
        socket: SocketId,
        /// Reason, for logs.
        reason: String,
    },

    /// REST request completed.
    Fetched(FetchResponse),

    /// Time tick for timeout processing.
    Tick,
}
