//! Query Execution Adapter.
//!
//! Wraps a managed SQL [`QueryService`] with submit/poll/fetch/cancel
//! primitives, strictly forward-only pagination, dialect rewriting and a
//! caller-facing error taxonomy ([`QueryError`]).

mod adapter;
mod dialect;
mod error;
mod memory;
mod result;
mod service;

pub use adapter::{
    classify_failure, FetchPage, QueryAdapterConfig, QueryExecutionAdapter, QueryRun,
    StagingLocation,
};
pub use dialect::{rewrite_ilike, rewrite_sql, translate_catalog_queries};
pub use error::QueryError;
pub use memory::{MemoryQueryService, ScriptedQuery};
pub use result::QueryResult;
pub use service::{QueryService, QueryState, QueryStatus, ResultPage};
