//! Backend API abstraction
//!
//! The research backend is reached through exactly two HTTP/JSON endpoints:
//!
//! - `POST {base}/api/chat` submits a chat message
//! - `GET {base}/api/backtest/status/{task_id}` reports a backtest's progress
//!
//! The `BackendApi` trait is the seam between the conversation flow and the
//! transport. `HttpBackend` is the production implementation; tests plug in
//! scripted backends.

use async_trait::async_trait;
use sdk::errors::ClientError;
use sdk::types::{ChatResponse, StatusResponse};

pub mod http;

pub use http::HttpBackend;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Contract every backend implementation fulfils
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Send one user message and return the assistant's reply
    async fn chat(&self, message: &str) -> Result<ChatResponse>;

    /// Query the current status of a backtest task
    async fn task_status(&self, task_id: &str) -> Result<StatusResponse>;
}
