//! HTTP backend client
//!
//! Talks JSON to the research backend with `reqwest`. Transport failures are
//! mapped onto `ClientError` so callers can tell an unreachable server, a
//! timeout, a non-2xx reply and an unparseable body apart.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use sdk::errors::ClientError;
use sdk::types::{ChatRequest, ChatResponse, StatusResponse};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{BackendApi, Result};
use crate::config::BackendConfig;

/// JSON-over-HTTP implementation of [`BackendApi`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Base URL without trailing slash (e.g. "http://localhost:8000")
    base_url: String,

    /// HTTP client for API requests
    client: Client,
}

impl HttpBackend {
    /// Create a new backend client
    ///
    /// # Arguments
    /// * `base_url` - Backend root, e.g. "http://localhost:8000"
    /// * `timeout` - Upper bound for each request
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("Invalid backend URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Create a client from the `[backend]` config section
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Status URL with the task id encoded as a single path segment
    fn status_url(&self, task_id: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/api/backtest/status", self.base_url))
            .map_err(|e| ClientError::Config(format!("Invalid backend URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("Backend URL cannot be a base".to_string()))?
            .push(task_id);
        Ok(url)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_connect() {
            ClientError::BackendUnavailable(format!(
                "Cannot connect to backend at {}",
                self.base_url
            ))
        } else {
            ClientError::Network(e.to_string())
        }
    }

    /// Check the status code and decode the JSON body
    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        serde_json::from_slice(&bytes).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn chat(&self, message: &str) -> Result<ChatResponse> {
        let request = ChatRequest::new(message);

        tracing::debug!("POST {} ({} chars)", self.chat_url(), message.len());

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        tracing::info!(
            "Chat response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        self.decode(response).await
    }

    async fn task_status(&self, task_id: &str) -> Result<StatusResponse> {
        if task_id.trim().is_empty() {
            return Err(ClientError::InvalidTaskId(task_id.to_string()));
        }

        let url = self.status_url(task_id)?;
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let backend = backend("http://localhost:8000/");
        assert_eq!(backend.base_url(), "http://localhost:8000");
        assert_eq!(backend.chat_url(), "http://localhost:8000/api/chat");
    }

    #[test]
    fn test_status_url_encodes_task_id() {
        let backend = backend("http://localhost:8000");

        let plain = backend.status_url("t1").unwrap();
        assert_eq!(
            plain.as_str(),
            "http://localhost:8000/api/backtest/status/t1"
        );

        let odd = backend.status_url("a/b c").unwrap();
        assert_eq!(
            odd.as_str(),
            "http://localhost:8000/api/backtest/status/a%2Fb%20c"
        );
    }

    #[test]
    fn test_status_url_keeps_base_path() {
        let backend = backend("http://localhost:8000/quant");
        let url = backend.status_url("t1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/quant/api/backtest/status/t1"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = HttpBackend::new("not a url", Duration::from_secs(5));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_task_id_is_rejected() {
        let backend = backend("http://localhost:8000");
        let result = backend.task_status("  ").await;
        assert!(matches!(result, Err(ClientError::InvalidTaskId(_))));
    }

    #[tokio::test]
    async fn test_connection_error() {
        // Port 9 (discard) is closed on test machines
        let backend = backend("http://127.0.0.1:9");
        let result = backend.chat("hello").await;

        match result {
            Err(ClientError::BackendUnavailable(msg)) => {
                assert!(msg.contains("Cannot connect to backend"));
            }
            Err(ClientError::Network(_)) => {}
            other => panic!("Expected BackendUnavailable or Network, got: {:?}", other),
        }
    }
}
