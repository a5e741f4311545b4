//! Conversation state and submission flow
//!
//! [`Conversation`] is the shared, append-only message log together with
//! the most recent backtest result. Every change is published on the
//! [`MessageBus`] so renderers can follow along. [`ConversationController`]
//! drives a chat round trip and hands task ids to the job tracker.

use sdk::types::{BacktestResult, ConversationMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::message_bus::{Event, MessageBus};

pub mod controller;

pub use controller::{ConversationController, SubmitOutcome, CHAT_ERROR_MESSAGE};

#[derive(Debug, Default)]
struct ConversationState {
    messages: VecDeque<ConversationMessage>,
    latest_result: Option<BacktestResult>,
}

/// Shared handle to one conversation session
///
/// Clones refer to the same log. All methods are synchronous and hold the
/// internal lock only for the duration of the call.
#[derive(Clone)]
pub struct Conversation {
    state: Arc<Mutex<ConversationState>>,
    bus: MessageBus,
    max_messages: Option<usize>,
}

impl Conversation {
    /// Create an unbounded conversation publishing on `bus`
    pub fn new(bus: MessageBus) -> Self {
        Self::with_limit(bus, None)
    }

    /// Create a conversation that keeps at most `max_messages` entries
    pub fn with_limit(bus: MessageBus, max_messages: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConversationState::default())),
            bus,
            max_messages: max_messages.filter(|max| *max > 0),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn push_user(&self, content: impl Into<String>) {
        self.push(ConversationMessage::user(content));
    }

    pub fn push_assistant(&self, content: impl Into<String>) {
        self.push(ConversationMessage::assistant(content));
    }

    /// Append a message, evicting the oldest one when the log is full
    pub fn push(&self, message: ConversationMessage) {
        {
            let mut state = self.lock();
            state.messages.push_back(message.clone());
            if let Some(max) = self.max_messages {
                while state.messages.len() > max {
                    state.messages.pop_front();
                }
            }
        }
        self.bus.publish(Event::MessageAppended { message });
    }

    /// Replace the latest backtest result
    pub fn set_result(&self, result: BacktestResult) {
        self.lock().latest_result = Some(result.clone());
        self.bus.publish(Event::ResultUpdated { result });
    }

    /// Snapshot of the log in display order
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn latest_result(&self) -> Option<BacktestResult> {
        self.lock().latest_result.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_bus::EventType;
    use sdk::types::Role;

    #[test]
    fn test_messages_keep_insertion_order() {
        let conversation = Conversation::new(MessageBus::new());
        conversation.push_user("回测VOO");
        conversation.push_assistant("ok");

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "回测VOO");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let conversation = Conversation::with_limit(MessageBus::new(), Some(2));
        conversation.push_user("one");
        conversation.push_user("two");
        conversation.push_user("three");

        let contents: Vec<_> = conversation
            .messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[test]
    fn test_zero_limit_means_unbounded() {
        let conversation = Conversation::with_limit(MessageBus::new(), Some(0));
        conversation.push_user("one");
        conversation.push_user("two");
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_result_is_replaced() {
        let conversation = Conversation::new(MessageBus::new());
        assert!(conversation.latest_result().is_none());

        conversation.set_result(BacktestResult::for_symbol("VOO"));
        conversation.set_result(BacktestResult::for_symbol("QQQ"));

        assert_eq!(
            conversation.latest_result().unwrap().symbol.as_deref(),
            Some("QQQ")
        );
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::All);
        let conversation = Conversation::new(bus);

        conversation.push_assistant("hello");
        conversation.set_result(BacktestResult::for_symbol("SPY"));

        match rx.recv().await.unwrap() {
            Event::MessageAppended { message } => assert_eq!(message.content, "hello"),
            other => panic!("Unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Event::ResultUpdated { result } => assert_eq!(result.symbol.as_deref(), Some("SPY")),
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
