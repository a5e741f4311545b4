//! Message Bus for conversation and tracking events
//!
//! The MessageBus lets the terminal renderer (and `ask --wait`) observe the
//! session without being coupled to the conversation or the job tracker.
//! Publishers never block: events are delivered with `try_send` into bounded
//! per-subscriber channels, so publishing is safe from inside short
//! synchronous critical sections. A subscriber that falls
//! `CHANNEL_BUFFER_SIZE` events behind loses the overflow.

use sdk::types::{BacktestResult, ConversationMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::tracker::CycleOutcome;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A message was appended to the conversation
    MessageAppended,
    /// The latest backtest result was replaced
    ResultUpdated,
    /// A poll cycle started
    TrackingStarted,
    /// A poll cycle ended (completed, failed or cancelled)
    TrackingFinished,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone)]
pub enum Event {
    MessageAppended { message: ConversationMessage },
    ResultUpdated { result: BacktestResult },
    TrackingStarted { task_id: String },
    TrackingFinished {
        task_id: String,
        outcome: CycleOutcome,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::MessageAppended { .. } => EventType::MessageAppended,
            Event::ResultUpdated { .. } => EventType::ResultUpdated,
            Event::TrackingStarted { .. } => EventType::TrackingStarted,
            Event::TrackingFinished { .. } => EventType::TrackingFinished,
        }
    }
}

/// Message bus for pub/sub communication between components
///
/// Cloning the bus yields another handle to the same subscriber table.
#[derive(Clone)]
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event goes to subscribers of its type and to `EventType::All`
    /// subscribers. Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!("Subscriber for {:?} is lagging, event dropped", key);
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }

}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
