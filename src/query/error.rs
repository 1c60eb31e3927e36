use thiserror::Error;

use crate::error::ErrorCode;

use super::service::QueryState;

/// Errors surfaced by the query execution adapter.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Retryable by the caller with backoff.
    #[error("Query service throttled the request")]
    Throttling { retry_after_secs: Option<u64> },
    /// The engine's message, unchanged.
    #[error("{0}")]
    SyntaxError(String),
    #[error("Result too large: {0}. Narrow the query (add filters or a LIMIT)")]
    ResultTooLarge(String),
    #[error("Query failed: {0}")]
    ExecutionFailed(String),
    #[error("Query cancelled: {0}")]
    Cancelled(String),
    #[error("Query {query_id} did not finish within {timeout_secs}s")]
    Timeout { query_id: String, timeout_secs: u64 },
    #[error("Invalid staging location: {0}")]
    InvalidStagingLocation(String),
    #[error("Unknown query: {0}")]
    UnknownQuery(String),
    #[error("Query {query_id} is {state:?}, results are not available")]
    NotReady { query_id: String, state: QueryState },
    #[error("Stale cursor for query {query_id}: expected '{expected}', got '{got}'")]
    StaleCursor {
        query_id: String,
        expected: String,
        got: String,
    },
    #[error("Query service repeated page token '{token}' for query {query_id}")]
    RepeatedCursor { query_id: String, token: String },
    #[error("Query service error: {0}")]
    Service(String),
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Throttling { .. })
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            QueryError::Throttling { .. } => ErrorCode::Throttling,
            QueryError::SyntaxError(_) => ErrorCode::SyntaxError,
            QueryError::ResultTooLarge(_) => ErrorCode::ResultTooLarge,
            QueryError::ExecutionFailed(_) => ErrorCode::ExecutionFailure,
            QueryError::Cancelled(_) => ErrorCode::Cancelled,
            QueryError::Timeout { .. } => ErrorCode::Timeout,
            QueryError::InvalidStagingLocation(_) => ErrorCode::ConfigError,
            QueryError::UnknownQuery(_)
            | QueryError::NotReady { .. }
            | QueryError::StaleCursor { .. }
            | QueryError::RepeatedCursor { .. }
            | QueryError::Service(_) => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttling_is_retryable() {
        assert!(QueryError::Throttling { retry_after_secs: None }.is_retryable());
        assert!(!QueryError::SyntaxError("x".into()).is_retryable());
        assert!(!QueryError::ResultTooLarge("x".into()).is_retryable());
    }

    #[test]
    fn test_syntax_error_is_verbatim() {
        let msg = "line 1:8: mismatched input 'FORM'";
        assert_eq!(QueryError::SyntaxError(msg.into()).to_string(), msg);
        assert_eq!(
            QueryError::SyntaxError(msg.into()).error_code(),
            ErrorCode::SyntaxError
        );
    }
}
