//! Production HTTP caller backed by `reqwest`.

use crate::collab::{HttpCallError, HttpCallRequest, HttpCallResponse, HttpCaller};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// An [`HttpCaller`] over a shared `reqwest` client with a per-call
/// timeout.
#[derive(Debug, Clone)]
pub struct ReqwestCaller {
    client: reqwest::Client,
}

impl ReqwestCaller {
    /// Builds a caller with the given per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, HttpCallError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HttpCallError::InvalidRequest {
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpCaller for ReqwestCaller {
    async fn call(&self, request: HttpCallRequest) -> Result<HttpCallResponse, HttpCallError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            HttpCallError::InvalidRequest {
                message: format!("invalid http method: {}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpCallError::Timeout
            } else if e.is_builder() || e.is_request() {
                HttpCallError::InvalidRequest {
                    message: e.to_string(),
                }
            } else {
                HttpCallError::Transport {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| HttpCallError::Transport {
                message: e.to_string(),
            })?;

        // Non-JSON bodies are preserved as a JSON string so merge
        // semantics stay uniform.
        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));

        Ok(HttpCallResponse { status, body })
    }
}
