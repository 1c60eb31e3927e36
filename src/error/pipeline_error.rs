//! Pipeline-level error types.

use crate::domain::execution::JobState;
use crate::dsl::validation::ValidationReport;
use thiserror::Error;

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("DSL parse error: {0}")]
    DslParseError(String),
    #[error("Unsupported DSL version: {found}, supported versions: {supported}")]
    UnsupportedVersion { found: String, supported: String },
    #[error("Validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Graph build error: {0}")]
    GraphBuildError(String),
    #[error("Phase not found: {0}")]
    PhaseNotFound(String),
    #[error("Job entry not found: {0}")]
    EntryNotFound(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Illegal state transition for job {job}: {from:?} -> {to:?}")]
    InvalidTransition {
        job: String,
        from: JobState,
        to: JobState,
    },
    #[error("Artifact upload failed: {0}")]
    UploadFailed(String),
    #[error("Pipeline aborted: {0}")]
    Aborted(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Process exit code for errors raised before any job is submitted.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::DslParseError(_)
            | PipelineError::UnsupportedVersion { .. }
            | PipelineError::ValidationFailed(_)
            | PipelineError::GraphBuildError(_)
            | PipelineError::PhaseNotFound(_)
            | PipelineError::EntryNotFound(_)
            | PipelineError::ConfigError(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_display() {
        assert_eq!(
            PipelineError::DslParseError("x".into()).to_string(),
            "DSL parse error: x"
        );
        assert_eq!(
            PipelineError::UnsupportedVersion {
                found: "1".into(),
                supported: "2".into()
            }
            .to_string(),
            "Unsupported DSL version: 1, supported versions: 2"
        );
        assert_eq!(
            PipelineError::PhaseNotFound("clean".into()).to_string(),
            "Phase not found: clean"
        );
        assert_eq!(
            PipelineError::UploadFailed("denied".into()).to_string(),
            "Artifact upload failed: denied"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = PipelineError::InvalidTransition {
            job: "clean".into(),
            from: JobState::Succeeded,
            to: JobState::Running,
        };
        let msg = err.to_string();
        assert!(msg.contains("clean"));
        assert!(msg.contains("Succeeded"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PipelineError::ConfigError("x".into()).exit_code(), 2);
        assert_eq!(PipelineError::PhaseNotFound("x".into()).exit_code(), 2);
        let report = ValidationReport {
            is_valid: false,
            diagnostics: vec![],
        };
        assert_eq!(PipelineError::ValidationFailed(Box::new(report)).exit_code(), 2);
        assert_eq!(PipelineError::UploadFailed("x".into()).exit_code(), 1);
        assert_eq!(PipelineError::InternalError("x".into()).exit_code(), 1);
    }
}
