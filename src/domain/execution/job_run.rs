use crate::error::{ErrorCode, PipelineError, PipelineResult};
use crate::graph::JobSpec;

use super::report::JobReport;
use super::status::JobState;

/// Mutable record of one submitted (or skipped) job within a graph run.
///
/// Only the executor mutates a `JobRun`, and only through [`JobRun::transition`].
#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: String,
    pub spec: JobSpec,
    pub state: JobState,
    pub attempts: u32,
    pub remote_run_id: Option<String>,
    pub submitted_at: Option<i64>,
    pub terminal_at: Option<i64>,
    pub message: Option<String>,
    pub error_code: Option<ErrorCode>,
}

impl JobRun {
    pub fn new(id: String, spec: JobSpec) -> Self {
        Self {
            id,
            spec,
            state: JobState::Pending,
            attempts: 0,
            remote_run_id: None,
            submitted_at: None,
            terminal_at: None,
            message: None,
            error_code: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Move to `next`. Re-entering the current non-terminal state is a no-op.
    pub fn transition(&mut self, next: JobState, now_millis: i64) -> PipelineResult<()> {
        if next == self.state && !next.is_terminal() {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                job: self.spec.name.clone(),
                from: self.state,
                to: next,
            });
        }
        if next == JobState::Submitted {
            self.submitted_at = Some(now_millis);
        }
        if next.is_terminal() {
            self.terminal_at = Some(now_millis);
        }
        self.state = next;
        Ok(())
    }

    /// Terminal transition carrying a failure classification.
    pub fn finish_with(
        &mut self,
        state: JobState,
        code: Option<ErrorCode>,
        message: impl Into<String>,
        now_millis: i64,
    ) -> PipelineResult<()> {
        self.transition(state, now_millis)?;
        self.error_code = code;
        let message = message.into();
        if !message.is_empty() {
            self.message = Some(message);
        }
        Ok(())
    }

    pub fn to_report(&self) -> JobReport {
        JobReport {
            name: self.spec.name.clone(),
            phase: self.spec.phase.clone(),
            state: self.state,
            attempts: self.attempts,
            remote_run_id: self.remote_run_id.clone(),
            message: self.message.clone(),
            error_code: self.error_code,
            submitted_at: self.submitted_at,
            terminal_at: self.terminal_at,
        }
    }
}
