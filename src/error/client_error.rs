use thiserror::Error;

use super::ErrorCode;

/// Errors surfaced by a batch job client.
///
/// Only [`Throttled`](ClientError::Throttled) and [`Transient`](ClientError::Transient)
/// are retried by the executor, and only at submission time.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Throttled by batch service")]
    Throttled { retry_after_secs: Option<u64> },
    #[error("Transient service error: {0}")]
    Transient(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Job run not found: {0}")]
    NotFound(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Throttled { .. } | ClientError::Transient(_) | ClientError::Network(_)
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ClientError::Throttled { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        if self.is_transient() {
            ErrorCode::TransientSubmission
        } else {
            ErrorCode::SubmissionRejected
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}
