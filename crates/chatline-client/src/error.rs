//! Client error types.

use chatline_core::TransportError;
use thiserror::Error;

/// Errors from configuration, the UI handle, and the production driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The token provider could not supply a token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The runtime has stopped; no further commands are accepted.
    #[error("runtime stopped")]
    Closed,

    /// Push channel I/O failed.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// REST call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
