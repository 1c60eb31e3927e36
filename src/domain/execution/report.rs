use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

use super::status::JobState;

/// Overall outcome of a graph run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialFailure,
    Aborted,
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub phase: String,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<i64>,
}

/// Aggregate report of a graph run, jobs in phase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphReport {
    pub status: OverallStatus,
    pub jobs: Vec<JobReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl GraphReport {
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<JobState> {
        self.job(name).map(|j| j.state)
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    /// Jobs left submitted or running because the run did not wait on them.
    pub fn unawaited(&self) -> usize {
        self.jobs.iter().filter(|j| !j.state.is_terminal()).count()
    }

    pub fn exit_code(&self) -> u8 {
        match self.status {
            OverallStatus::Success => 0,
            OverallStatus::PartialFailure | OverallStatus::Aborted => 1,
        }
    }

    /// Human readable summary, one line per job followed by totals.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.jobs.len() + 2);
        for job in &self.jobs {
            let mut line = format!("[{}] {} - {}", job.phase, job.name, job.state);
            if let Some(run_id) = &job.remote_run_id {
                line.push_str(&format!(" (run {})", run_id));
            }
            if let Some(message) = &job.message {
                line.push_str(&format!(": {}", message));
            }
            lines.push(line);
        }
        lines.push(format!(
            "Succeeded: {}/{}  Failed: {}  Not submitted: {}",
            self.count(JobState::Succeeded),
            self.jobs.len(),
            self.jobs.iter().filter(|j| j.state.is_failure()).count(),
            self.count(JobState::NotSubmitted),
        ));
        let unawaited = self.unawaited();
        if unawaited > 0 {
            lines.push(format!("{} submitted, not awaited", unawaited));
        }
        let status = match self.status {
            OverallStatus::Success => "Success".to_string(),
            OverallStatus::PartialFailure => "PartialFailure".to_string(),
            OverallStatus::Aborted => match &self.abort_reason {
                Some(reason) => format!("Aborted ({})", reason),
                None => "Aborted".to_string(),
            },
        };
        lines.push(format!("Overall: {}", status));
        lines.join("\n")
    }
}
