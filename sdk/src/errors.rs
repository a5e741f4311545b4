//! Error types and handling
//!
//! This module provides the error type shared by the Quant Copilot crates.
//! Errors implement the `CopilotErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Hints never contain backend URLs, request bodies or file paths, so they
//! are safe to print next to a conversation transcript.

use thiserror::Error;

/// Trait for Quant Copilot error extensions
pub trait CopilotErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around (a flaky network,
    /// a backend that is still starting). Non-recoverable errors need the
    /// user to change something first.
    fn is_recoverable(&self) -> bool;
}

/// Main client error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Backend**: HTTP transport failures, non-2xx replies, bad payloads
/// - **Tracking**: Invalid task identifiers
///
/// # Examples
///
/// ```
/// use sdk::errors::{ClientError, CopilotErrorExt};
///
/// let error = ClientError::Timeout;
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = ClientError::Config("bad log level".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum ClientError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backend errors
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend returned HTTP {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    // Tracking errors
    #[error("Invalid task id: {0:?}")]
    InvalidTaskId(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CopilotErrorExt for ClientError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::BackendUnavailable(_) => "Backend is not reachable. Is the server running?",
            Self::BackendStatus { status, .. } if *status >= 500 => {
                "Backend failed to handle the request. Try again later"
            }
            Self::BackendStatus { .. } => "Backend rejected the request",
            Self::MalformedResponse(_) => "Backend reply could not be understood",
            Self::Timeout => "Backend took too long to respond. Try again",
            Self::Network(_) => "Network operation failed. Check your connection",

            Self::InvalidTaskId(_) => "Task id must be a non-empty string",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::InvalidTaskId(_) | Self::MalformedResponse(_) => false,
            Self::BackendStatus { status, .. } => *status >= 500 || *status == 429,
            _ => true,
        }
    }
}
