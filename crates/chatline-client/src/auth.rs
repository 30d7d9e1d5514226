//! Bearer token collaborator.
//!
//! Credential storage and session lifecycle live outside this crate. The
//! driver only asks a [`TokenProvider`] for the current token whenever it
//! opens a socket or issues a request.

use crate::error::ClientError;

/// Supplies the opaque token used for REST and push channel auth.
pub trait TokenProvider: Send + Sync + 'static {
    /// Current token.
    ///
    /// # Errors
    ///
    /// `ClientError::Auth` if no token is available.
    fn token(&self) -> Result<String, ClientError>;
}

/// Fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<String, ClientError> {
        if self.0.is_empty() {
            return Err(ClientError::Auth("empty token".into()));
        }
        Ok(self.0.clone())
    }
}

/// `Authorization` header value for a token.
pub fn authorization_header(token: &str) -> String {
    format!("Token {token}")
}
