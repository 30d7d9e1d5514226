//! Client configuration.
//!
//! [`ClientConfig`] gathers everything the runtime and the production driver
//! need. Defaults point at a local development server.

use std::time::Duration;

use chatline_core::{ConnectionConfig, CurrentUser, StoreConfig};

use crate::error::ClientError;

/// Default REST API base URL.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/";

/// Default push channel URL.
pub const DEFAULT_PUSH_URL: &str = "ws://127.0.0.1:8000/ws/chat/";

/// Interval between ticks driving timeouts and reconnects.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Runtime and driver configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API. Request paths are joined onto it.
    pub api_base: String,
    /// Push channel endpoint. The token is appended as a query parameter.
    pub push_url: String,
    /// Push channel timeouts and backoff.
    pub connection: ConnectionConfig,
    /// Store timeouts.
    pub store: StoreConfig,
    /// Tick period.
    pub tick_interval: Duration,
    /// Local user identity, used to recognize echoes of our own sends.
    pub current_user: CurrentUser,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            connection: ConnectionConfig::default(),
            store: StoreConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            current_user: CurrentUser::default(),
        }
    }
}

impl ClientConfig {
    /// Check the configuration for values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "api base must be an http(s) URL, got {:?}",
                self.api_base
            )));
        }
        if !(self.push_url.starts_with("ws://") || self.push_url.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "push url must be a ws(s) URL, got {:?}",
                self.push_url
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(ClientError::Config("tick interval must be non-zero".into()));
        }
        if self.connection.connect_timeout < self.tick_interval {
            return Err(ClientError::Config(
                "connect timeout must be at least one tick interval".into(),
            ));
        }
        if self.connection.backoff.base_delay > self.connection.backoff.max_delay {
            return Err(ClientError::Config("backoff base delay exceeds max delay".into()));
        }
        Ok(())
    }

    /// Absolute URL of a REST path.
    pub fn api_url(&self, path: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn api_url_joins_single_slash() {
        let config = ClientConfig { api_base: "https://chat.example/api".into(), ..Default::default() };
        assert_eq!(config.api_url("chat/chats/"), "https://chat.example/api/chat/chats/");

        let config = ClientConfig { api_base: "https://chat.example/api/".into(), ..Default::default() };
        assert_eq!(config.api_url("/chat/chats/7/"), "https://chat.example/api/chat/chats/7/");
    }

    #[test]
    fn rejects_bad_schemes() {
        let config = ClientConfig { push_url: "http://x/ws/".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let config = ClientConfig { api_base: "ftp://x/".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn rejects_zero_tick() {
        let config = ClientConfig { tick_interval: Duration::ZERO, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
