//! Message submission flow
//!
//! One round trip: record the user's message, ask the backend, record the
//! reply, and hand the first task id (if any) to the job tracker. Errors
//! never escape; a failed chat request becomes a fixed assistant message.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::Conversation;
use crate::backend::BackendApi;
use crate::tracker::JobTracker;

/// Assistant message shown when the chat request itself fails
pub const CHAT_ERROR_MESSAGE: &str = "请求失败，请检查后端服务后重试。";

/// What `submit` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Blank input, nothing was sent
    Ignored,
    /// Backend replied; `task_id` is set when tracking started
    Replied { task_id: Option<String> },
    /// Chat request failed; the error message was appended
    Failed,
}

/// Drives the conversation and owns the job tracker
pub struct ConversationController {
    backend: Arc<dyn BackendApi>,
    conversation: Conversation,
    tracker: JobTracker,
}

impl ConversationController {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        conversation: Conversation,
        poll_interval: Duration,
    ) -> Self {
        let tracker = JobTracker::new(Arc::clone(&backend), conversation.clone(), poll_interval);
        Self {
            backend,
            conversation,
            tracker,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Submit one user message
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        self.conversation.push_user(text);

        let response = match self.backend.chat(text).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Chat request via {} failed: {}", self.backend.name(), e);
                self.conversation.push_assistant(CHAT_ERROR_MESSAGE);
                return SubmitOutcome::Failed;
            }
        };

        if !response.reply.is_empty() {
            self.conversation.push_assistant(response.reply.as_str());
        }

        let task_id = response.first_task_id().map(str::to_string);
        if let Some(task_id) = &task_id {
            self.tracker.start_tracking(task_id);
        }

        SubmitOutcome::Replied { task_id }
    }

    /// Cancel any tracking in progress
    pub fn shutdown(&self) {
        self.tracker.teardown();
    }
}
