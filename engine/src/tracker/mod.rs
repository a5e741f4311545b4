//! Single-flight backtest job tracker
//!
//! The [`JobTracker`] owns at most one poll cycle at a time. A cycle is a
//! spawned task that asks the backend for a task's status on a fixed
//! interval until the backend reports `complete` or `failed`.
//!
//! # Invariants
//!
//! - The active cycle (generation, task id, task handle) is stored in one
//!   mutex-guarded slot. `start_tracking` aborts the previous cycle and
//!   installs the new one inside a single critical section, so two cycles
//!   never have live timers at the same time.
//! - Every status response is checked against the slot before it is
//!   applied. A response for a generation that is no longer current is
//!   dropped, which covers requests that were already in flight when their
//!   cycle was superseded.
//! - Failed status requests are logged and retried on the next tick. They
//!   never end a cycle.
//! - Dropping the tracker tears the active cycle down.
//!
//! # State machine
//!
//! ```text
//! Idle --start_tracking--> Polling --complete--> Completed
//!                             |----failed-----> Failed
//!                             `--start/teardown--> Cancelled
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use sdk::errors::CopilotErrorExt;
use sdk::types::{StatusResponse, TaskStatus};

use crate::backend::BackendApi;
use crate::conversation::Conversation;
use crate::message_bus::Event;

/// Assistant message appended when a backtest completes
pub const COMPLETION_MESSAGE: &str = "回测完成！";

/// Prefix of the assistant message appended when a backtest fails
pub const FAILURE_PREFIX: &str = "回测失败：";

/// Used when the backend reports `failed` without an error text
pub const UNKNOWN_FAILURE: &str = "未知错误";

/// Default delay between two status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// How a poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    /// Backend reported `complete`
    Completed,
    /// Backend reported `failed`
    Failed,
    /// Superseded by a newer cycle or torn down
    Cancelled,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Completed => write!(f, "completed"),
            CycleOutcome::Failed => write!(f, "failed"),
            CycleOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Handle to the one live poll cycle
struct ActiveCycle {
    generation: u64,
    task_id: String,
    handle: JoinHandle<()>,
}

struct TrackerInner {
    backend: Arc<dyn BackendApi>,
    conversation: Conversation,
    poll_interval: Duration,
    active: Mutex<Option<ActiveCycle>>,
    next_generation: AtomicU64,
}

/// Tracks at most one backtest task at a time
///
/// Not `Clone`: the tracker owns its cycle, and dropping it cancels that
/// cycle. Share it behind an `Arc` if several owners need it.
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

impl JobTracker {
    /// Create a tracker polling `backend` every `poll_interval`
    ///
    /// Terminal outcomes are written into `conversation`.
    pub fn new(
        backend: Arc<dyn BackendApi>,
        conversation: Conversation,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                backend,
                conversation,
                poll_interval,
                active: Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start polling `task_id`, cancelling whatever cycle was running
    ///
    /// The first status check fires one interval after this call. Blank ids
    /// are logged and ignored. Must be called from within a tokio runtime.
    pub fn start_tracking(&self, task_id: &str) {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            warn!("Ignoring request to track an empty task id");
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        let superseded = {
            let mut active = self.inner.lock_active();

            let superseded = active.take().map(|previous| {
                previous.handle.abort();
                previous.task_id
            });

            let handle = tokio::spawn(run_cycle(
                Arc::clone(&self.inner),
                generation,
                task_id.to_string(),
            ));

            *active = Some(ActiveCycle {
                generation,
                task_id: task_id.to_string(),
                handle,
            });

            superseded
        };

        let bus = self.inner.conversation.bus();
        if let Some(previous) = superseded {
            info!("Task {} superseded by task {}", previous, task_id);
            bus.publish(Event::TrackingFinished {
                task_id: previous,
                outcome: CycleOutcome::Cancelled,
            });
        }

        info!(
            "Tracking task {} (cycle {}, every {}ms)",
            task_id,
            generation,
            self.inner.poll_interval.as_millis()
        );
        bus.publish(Event::TrackingStarted {
            task_id: task_id.to_string(),
        });
    }

    /// Cancel the active cycle, if any. Safe to call repeatedly.
    pub fn teardown(&self) {
        let cancelled = self.inner.lock_active().take();

        if let Some(cycle) = cancelled {
            cycle.handle.abort();
            info!("Stopped tracking task {}", cycle.task_id);
            self.inner
                .conversation
                .bus()
                .publish(Event::TrackingFinished {
                    task_id: cycle.task_id,
                    outcome: CycleOutcome::Cancelled,
                });
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.lock_active().is_some()
    }

    /// Task id of the active cycle
    pub fn active_task(&self) -> Option<String> {
        self.inner
            .lock_active()
            .as_ref()
            .map(|cycle| cycle.task_id.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl TrackerInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCycle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(self.lock_active().as_ref(), Some(cycle) if cycle.generation == generation)
    }

    /// Apply one status response. Returns true when the cycle must stop.
    fn settle(&self, generation: u64, task_id: &str, response: StatusResponse) -> bool {
        let mut active = self.lock_active();

        if !matches!(active.as_ref(), Some(cycle) if cycle.generation == generation) {
            debug!("Discarding status of superseded task {}", task_id);
            return true;
        }

        if !response.status.is_terminal() {
            debug!("Task {} is {}", task_id, response.status);
            return false;
        }
        active.take();

        let outcome = if response.status == TaskStatus::Complete {
            match response.result {
                Some(result) => self.conversation.set_result(result),
                None => warn!("Task {} completed without a result payload", task_id),
            }
            self.conversation.push_assistant(COMPLETION_MESSAGE);
            CycleOutcome::Completed
        } else {
            let error = response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
            self.conversation
                .push_assistant(format!("{}{}", FAILURE_PREFIX, error));
            CycleOutcome::Failed
        };
        drop(active);

        info!("Task {} {}", task_id, outcome);
        self.conversation.bus().publish(Event::TrackingFinished {
            task_id: task_id.to_string(),
            outcome,
        });
        true
    }
}

/// Body of one poll cycle
async fn run_cycle(inner: Arc<TrackerInner>, generation: u64, task_id: String) {
    let period = inner.poll_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !inner.is_current(generation) {
            debug!("Cycle {} for task {} is stale, exiting", generation, task_id);
            return;
        }

        match inner.backend.task_status(&task_id).await {
            Ok(response) => {
                if inner.settle(generation, &task_id, response) {
                    return;
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!("Status check for task {} failed, will retry: {}", task_id, e);
            }
            Err(e) => {
                error!(
                    "Status check for task {} failed ({}), will retry: {}",
                    task_id,
                    e.user_hint(),
                    e
                );
            }
        }
    }
}
