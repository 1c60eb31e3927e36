use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::execution::{JobState, OverallStatus};

/// Executor progress events, sent over the runtime context's channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorEvent {
    PhaseStarted {
        phase: String,
        ordinal: u32,
        timestamp: DateTime<Utc>,
    },
    JobSubmitted {
        job: String,
        run_id: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// A transient submission error; another attempt follows after `delay_ms`.
    JobRetry {
        job: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    JobStateChanged {
        job: String,
        state: JobState,
        timestamp: DateTime<Utc>,
    },
    JobTimedOut {
        job: String,
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    JobCancelled {
        job: String,
        run_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PhaseCompleted {
        phase: String,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
    GraphAborted {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    GraphCompleted {
        status: OverallStatus,
        timestamp: DateTime<Utc>,
    },
}

/// Event sender
pub type EventSender = mpsc::UnboundedSender<ExecutorEvent>;

/// Event receiver
pub type EventReceiver = mpsc::UnboundedReceiver<ExecutorEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
