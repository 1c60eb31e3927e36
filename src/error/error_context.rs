use serde::{Deserialize, Serialize};

/// Error retryability marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRetryability {
    Retryable,
    NonRetryable,
}

/// Error classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Orchestration
    TransientSubmission,
    SubmissionRejected,
    ExecutionFailure,
    DependencyAbort,
    Timeout,
    Cancelled,

    // Query
    Throttling,
    SyntaxError,
    ResultTooLarge,

    // Schema cache
    CacheCorruption,
    SchemaFetch,

    // Common
    ConfigError,
    InternalError,
}

impl ErrorCode {
    pub fn retryability(&self) -> ErrorRetryability {
        match self {
            ErrorCode::TransientSubmission | ErrorCode::Throttling => ErrorRetryability::Retryable,
            _ => ErrorRetryability::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryability() == ErrorRetryability::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_codes_are_retryable() {
        assert!(ErrorCode::TransientSubmission.is_retryable());
        assert!(ErrorCode::Throttling.is_retryable());
        assert!(!ErrorCode::ExecutionFailure.is_retryable());
        assert!(!ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::SyntaxError.is_retryable());
    }

    #[test]
    fn test_error_code_serde_snake_case() {
        let json = serde_json::to_value(ErrorCode::DependencyAbort).unwrap();
        assert_eq!(json, "dependency_abort");
        let code: ErrorCode = serde_json::from_value(serde_json::json!("result_too_large")).unwrap();
        assert_eq!(code, ErrorCode::ResultTooLarge);
    }
}
