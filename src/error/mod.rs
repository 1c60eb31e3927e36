//! Error types for the orchestration layer.
//!
//! - [`PipelineError`]: Top-level errors for parsing, validating and running a pipeline.
//! - [`ClientError`]: Errors raised by a [`BatchJobClient`](crate::client::BatchJobClient).
//! - [`ErrorCode`]: Failure taxonomy carried into job reports.
//!
//! Query and catalog errors live next to their modules
//! ([`QueryError`](crate::query::QueryError), [`CatalogError`](crate::catalog::CatalogError)).

pub mod client_error;
pub mod error_context;
pub mod pipeline_error;

pub use client_error::ClientError;
pub use error_context::{ErrorCode, ErrorRetryability};
pub use pipeline_error::PipelineError;

/// Convenience alias for pipeline-level results.
pub type PipelineResult<T> = Result<T, PipelineError>;
/// Convenience alias for batch client results.
pub type ClientResult<T> = Result<T, ClientError>;
