use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a phase gates the phases after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// Every member must reach a terminal state before the next phase starts;
    /// any failure aborts the graph.
    #[default]
    Blocking,
    /// Members run concurrently and failures stay isolated to the failing job.
    Parallel,
}

/// Immutable description of one job, fixed before a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    /// Name of the owning phase.
    pub phase: String,
    pub phase_ordinal: u32,
    /// Registry key of the entry point to submit.
    pub entry: String,
    pub depends_on: Vec<String>,
    /// Per-job deadline; falls back to the executor default.
    pub timeout: Option<Duration>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, phase: impl Into<String>, phase_ordinal: u32) -> Self {
        let name = name.into();
        Self {
            entry: name.clone(),
            name,
            phase: phase.into(),
            phase_ordinal,
            depends_on: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn depends_on(mut self, job: impl Into<String>) -> Self {
        self.depends_on.push(job.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub ordinal: u32,
    pub gating: GatingMode,
    pub jobs: Vec<JobSpec>,
}

impl Phase {
    /// Create a phase; member jobs are added with [`Phase::job`].
    pub fn new(name: impl Into<String>, ordinal: u32, gating: GatingMode) -> Self {
        Self {
            name: name.into(),
            ordinal,
            gating,
            jobs: Vec::new(),
        }
    }

    /// Add a job named `name` whose entry is its own name.
    pub fn job(self, name: impl Into<String>) -> Self {
        self.job_with(name, |spec| spec)
    }

    /// Add a job, letting `f` refine the generated spec.
    pub fn job_with(
        mut self,
        name: impl Into<String>,
        f: impl FnOnce(JobSpec) -> JobSpec,
    ) -> Self {
        let spec = JobSpec::new(name, self.name.clone(), self.ordinal);
        self.jobs.push(f(spec));
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.gating == GatingMode::Blocking
    }
}
