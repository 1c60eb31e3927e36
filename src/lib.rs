//! # batchflow: phase-gated batch job orchestration
//!
//! `batchflow` drives a multi-phase data pipeline against a managed batch
//! compute service. A pipeline is described in a YAML, JSON or TOML DSL:
//!
//! - **Job graph executor**: phases run in ordinal order. Blocking phases
//!   drain before the next phase is admitted; parallel phases do not gate.
//!   Submissions retry transient errors with backoff, runs are polled on a
//!   fixed schedule and cancelled once when their deadline expires.
//! - **Query execution adapter**: submit, poll and paginate SQL queries with
//!   a monotonic cursor and a classified failure taxonomy.
//! - **Schema reconciliation cache**: fingerprint the live catalog, diff it
//!   against the persisted training cache and train only the drift.
//! - **DSL validation**: structure and topology layers with coded diagnostics.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use batchflow::client::ScriptedBatchJobClient;
//! use batchflow::{build_graph, parse_dsl, DslFormat, JobGraphExecutor, JobRegistry, SubmitContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let yaml = std::fs::read_to_string("pipelines/nyc_taxi.yaml")?;
//!     let schema = parse_dsl(&yaml, DslFormat::Yaml)?;
//!     let graph = build_graph(&schema)?;
//!
//!     let registry =
//!         JobRegistry::with_entries(SubmitContext::new("s3://my-bucket"), schema.entries.clone());
//!     let executor = JobGraphExecutor::new(
//!         Arc::new(ScriptedBatchJobClient::new()),
//!         registry,
//!         schema.executor.clone(),
//!     );
//!
//!     let report = executor.execute(&graph).await;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod core;
pub mod domain;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod query;

pub use crate::catalog::{CatalogError, ReconcileOutcome, SchemaReconciler, TrainingCacheStore};
pub use crate::client::BatchJobClient;
pub use crate::config::ServiceConfig;
pub use crate::core::{
    CancelSignal, ExecutorEvent, FakeIdGenerator, FakeTimeProvider, IdGenerator,
    JobGraphExecutor, RealIdGenerator, RealTimeProvider, RuntimeContext, TimeProvider,
};
pub use crate::domain::execution::{GraphReport, JobReport, JobState, OverallStatus};
pub use crate::dsl::{
    parse_dsl, validate_dsl, validate_schema, Diagnostic, DiagnosticLevel, DslFormat,
    ExecutorConfig, PipelineSchema, ValidationReport,
};
pub use crate::error::{ClientError, ErrorCode, PipelineError, PipelineResult};
pub use crate::graph::{build_graph, JobGraph, JobSpec, Phase};
pub use crate::jobs::{JobRegistry, SubmitContext};
pub use crate::query::{QueryError, QueryExecutionAdapter, QueryService};
