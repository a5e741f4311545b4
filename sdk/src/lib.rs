//! Quant Copilot SDK
//!
//! Shared types for the Quant Copilot client: the conversation model, the
//! backend wire format and the error type used across crates.

/// Error types and handling
pub mod errors;

/// Conversation and backend wire types
pub mod types;

// Re-export commonly used types
pub use errors::{ClientError, CopilotErrorExt};
pub use types::{
    BacktestResult, ChatRequest, ChatResponse, ConversationMessage, Role, StatusResponse,
    TaskDescriptor, TaskStatus,
};
