//! HTTP client for the REST endpoints.

use std::sync::Arc;

use chatline_core::{FetchRequest, FetchResponse, TransportError};
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::Value;

use crate::{ClientConfig, TokenProvider, auth::authorization_header};

/// Executes [`FetchRequest`]s against the REST API.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenProvider>,
}

impl RestClient {
    /// Create a client.
    pub fn new(config: Arc<ClientConfig>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { http: reqwest::Client::new(), config, tokens }
    }

    /// Execute a request and pair the result with it.
    pub async fn fetch(&self, request: FetchRequest) -> FetchResponse {
        let result = self.get_json(&request.path()).await;
        if let Err(e) = &result {
            tracing::warn!(path = %request.path(), error = %e, "request failed");
        }
        FetchResponse { request, result }
    }

    /// `GET` a path and decode the JSON body.
    ///
    /// A 204 or empty body yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// - `TransportError::Http` for non-2xx answers, carrying the body text
    /// - `TransportError::Network` if no answer arrived
    /// - `TransportError::Decode` if the body is not JSON
    pub async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let token =
            self.tokens.token().map_err(|e| TransportError::Network(format!("no token: {e}")))?;
        let url = self.config.api_url(path);

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, authorization_header(&token))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http { status: status.as_u16(), body });
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(Value::Null);
        }

        response.json::<Value>().await.map_err(|e| TransportError::Decode(e.to_string()))
    }
}
