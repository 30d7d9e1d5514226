//! Protocol errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input was not valid JSON or did not match the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame is a JSON object without a string `type` field.
    #[error("frame has no type field")]
    MissingType,

    /// Well-formed frame of a type this client does not understand.
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// Value could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Returns true if the frame was structurally broken, as opposed to
    /// merely of a kind this client ignores.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::MissingType)
    }
}
