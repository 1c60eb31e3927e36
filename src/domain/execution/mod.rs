//! Execution state types.

mod job_run;
mod report;
mod status;

pub use job_run::JobRun;
pub use report::{GraphReport, JobReport, OverallStatus};
pub use status::JobState;
