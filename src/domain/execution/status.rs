//! Job state, the canonical definition of JobRun states.
//!
//! ```text
//! Pending → Submitted → Running → {Succeeded | Failed | Cancelled | TimedOut}
//! Pending → {NotSubmitted | Failed}
//! ```
//!
//! `Failed` is reachable from `Pending` when the submission itself is rejected.
//! A job can also jump from `Submitted` straight to a terminal state when the
//! remote service finishes between two polls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
    NotSubmitted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded
                | JobState::Failed
                | JobState::Cancelled
                | JobState::TimedOut
                | JobState::NotSubmitted
        )
    }

    /// Terminal states that count as a failure of the job itself.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Cancelled | JobState::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match self {
            Pending => matches!(next, Submitted | NotSubmitted | Failed),
            Submitted => matches!(next, Running | Succeeded | Failed | Cancelled | TimedOut),
            Running => matches!(next, Succeeded | Failed | Cancelled | TimedOut),
            Succeeded | Failed | Cancelled | TimedOut | NotSubmitted => false,
        }
    }

    /// Map a remote batch-service state name onto the local state machine.
    ///
    /// Unknown names are treated as still running so the poll loop keeps going
    /// until the deadline.
    pub fn from_remote(state: &str) -> JobState {
        match state.to_ascii_uppercase().as_str() {
            "SUBMITTED" | "PENDING" | "SCHEDULED" | "QUEUED" => JobState::Submitted,
            "RUNNING" | "CANCELLING" | "STOPPING" => JobState::Running,
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => JobState::Succeeded,
            "FAILED" | "ERROR" => JobState::Failed,
            "CANCELLED" | "STOPPED" => JobState::Cancelled,
            _ => JobState::Running,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "Pending",
            JobState::Submitted => "Submitted",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
            JobState::TimedOut => "TimedOut",
            JobState::NotSubmitted => "NotSubmitted",
        };
        f.write_str(s)
    }
}
