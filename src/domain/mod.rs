//! Domain layer: run-state model shared by the executor, the CLI and reports.
//!
//! Submodules:
//! - [`execution`]: JobRun state machine, job and graph reports.

pub mod execution;
