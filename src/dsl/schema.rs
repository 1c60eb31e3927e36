use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::GatingMode;

pub const CURRENT_DSL_VERSION: &str = "0.1.0";
pub const SUPPORTED_DSL_VERSIONS: &[&str] = &["0.1.0"];

// ================================
// Pipeline
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PipelineSchema {
    pub version: String,
    #[serde(default)]
    pub name: String,
    /// Runnable entry points keyed by name.
    #[serde(default)]
    pub entries: BTreeMap<String, JobEntry>,
    #[serde(default)]
    pub phases: Vec<PhaseSchema>,
    /// Local files uploaded before any job is submitted.
    #[serde(default)]
    pub artifacts: Vec<ArtifactSchema>,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhaseSchema {
    pub name: String,
    /// Defaults to the phase's index in the list.
    #[serde(default)]
    pub ordinal: Option<u32>,
    #[serde(default)]
    pub gating: GatingMode,
    #[serde(default)]
    pub jobs: Vec<JobSchema>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JobSchema {
    pub name: String,
    /// Entry key; defaults to the job name.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default, alias = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl JobSchema {
    pub fn entry_key(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.name)
    }
}

/// What a job actually runs on the compute service.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobEntry {
    SparkSubmit {
        script: String,
        /// Archive of shared modules, relative to the code prefix.
        #[serde(default)]
        py_files: Option<String>,
        #[serde(default)]
        spark_conf: BTreeMap<String, String>,
    },
    Crawler {
        crawler: String,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSchema {
    pub path: String,
    pub key: String,
}

// ================================
// Executor
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Deadline applied to jobs without their own `timeout_secs`.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Also wait for parallel-phase jobs nothing depends on.
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            wait: false,
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_concurrency() -> usize { 4 }
fn default_poll_interval_ms() -> u64 { 10_000 }
fn default_job_timeout_secs() -> u64 { 3_600 }

/// Submission retry policy. Applies to transient submission errors only.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base interval in milliseconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval: default_retry_interval(),
            backoff_strategy: default_backoff_strategy(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_interval: default_max_retry_interval(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
    ExponentialWithJitter,
}

fn default_max_retries() -> u32 { 3 }
fn default_retry_interval() -> u64 { 1_000 }
fn default_backoff_strategy() -> BackoffStrategy { BackoffStrategy::Exponential }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_max_retry_interval() -> u64 { 60_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_entry_tagged_variants() {
        let json = r#"{"type":"spark-submit","script":"clean.py","spark_conf":{"spark.executor.memory":"4g"}}"#;
        let entry: JobEntry = serde_json::from_str(json).unwrap();
        match entry {
            JobEntry::SparkSubmit { script, py_files, spark_conf } => {
                assert_eq!(script, "clean.py");
                assert!(py_files.is_none());
                assert_eq!(spark_conf.get("spark.executor.memory").map(String::as_str), Some("4g"));
            }
            other => panic!("unexpected entry: {:?}", other),
        }

        let crawler: JobEntry = serde_json::from_str(r#"{"type":"crawler","crawler":"taxi"}"#).unwrap();
        assert_eq!(crawler, JobEntry::Crawler { crawler: "taxi".into() });
    }

    #[test]
    fn test_executor_defaults() {
        let cfg: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.poll_interval_ms, 10_000);
        assert!(!cfg.wait);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.backoff_strategy, BackoffStrategy::Exponential);
    }

    #[test]
    fn test_job_entry_key_defaults_to_name() {
        let job: JobSchema = serde_json::from_str(r#"{"name":"clean","dependsOn":["lookup"]}"#).unwrap();
        assert_eq!(job.entry_key(), "clean");
        assert_eq!(job.depends_on, vec!["lookup"]);
    }
}
