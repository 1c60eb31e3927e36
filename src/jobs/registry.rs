use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dsl::schema::JobEntry;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::JobSpec;

/// Storage layout used when resolving script and log locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitContext {
    /// Bucket root including its scheme, e.g. `s3://my-bucket`.
    pub bucket_uri: String,
    pub code_prefix: String,
    pub log_prefix: String,
}

impl SubmitContext {
    pub fn new(bucket_uri: impl Into<String>) -> Self {
        Self {
            bucket_uri: bucket_uri.into().trim_end_matches('/').to_string(),
            code_prefix: "code/pyspark".to_string(),
            log_prefix: "logs/emr-serverless".to_string(),
        }
    }

    pub fn with_prefixes(
        mut self,
        code_prefix: impl Into<String>,
        log_prefix: impl Into<String>,
    ) -> Self {
        self.code_prefix = code_prefix.into().trim_matches('/').to_string();
        self.log_prefix = log_prefix.into().trim_matches('/').to_string();
        self
    }

    fn code_uri(&self, path: &str) -> String {
        format!("{}/{}/{}", self.bucket_uri, self.code_prefix, path)
    }

    fn log_uri(&self) -> String {
        format!("{}/{}/", self.bucket_uri, self.log_prefix)
    }
}

/// Driver payload handed to the batch service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobDriver {
    SparkSubmit {
        entry_point: String,
        #[serde(default)]
        entry_point_arguments: Vec<String>,
        spark_submit_parameters: String,
    },
    Crawler {
        crawler: String,
    },
}

/// A fully resolved submission for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job: String,
    pub driver: JobDriver,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_uri: Option<String>,
    /// Idempotency token sent with every submit attempt of this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

impl JobRequest {
    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }
}

/// Named entry points a pipeline can run.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    entries: BTreeMap<String, JobEntry>,
    context: SubmitContext,
}

impl JobRegistry {
    pub fn new(context: SubmitContext) -> Self {
        Self {
            entries: BTreeMap::new(),
            context,
        }
    }

    pub fn with_entries(context: SubmitContext, entries: BTreeMap<String, JobEntry>) -> Self {
        Self { entries, context }
    }

    pub fn register(&mut self, name: impl Into<String>, entry: JobEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&JobEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn resolve(&self, spec: &JobSpec) -> PipelineResult<JobRequest> {
        let entry = self
            .entries
            .get(&spec.entry)
            .ok_or_else(|| PipelineError::EntryNotFound(spec.entry.clone()))?;

        let request = match entry {
            JobEntry::SparkSubmit {
                script,
                py_files,
                spark_conf,
            } => {
                let mut params = Vec::new();
                if let Some(py_files) = py_files {
                    params.push(format!("--py-files {}", self.context.code_uri(py_files)));
                }
                for (key, value) in spark_conf {
                    params.push(format!("--conf {}={}", key, value));
                }
                JobRequest {
                    job: spec.name.clone(),
                    driver: JobDriver::SparkSubmit {
                        entry_point: self.context.code_uri(&format!("jobs/{}", script)),
                        entry_point_arguments: Vec::new(),
                        spark_submit_parameters: params.join(" "),
                    },
                    log_uri: Some(self.context.log_uri()),
                    client_token: None,
                }
            }
            JobEntry::Crawler { crawler } => JobRequest {
                job: spec.name.clone(),
                driver: JobDriver::Crawler {
                    crawler: crawler.clone(),
                },
                log_uri: None,
                client_token: None,
            },
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> JobRegistry {
        let mut conf = BTreeMap::new();
        conf.insert("spark.executor.cores".to_string(), "4".to_string());
        conf.insert("spark.executor.memory".to_string(), "16g".to_string());
        let mut registry = JobRegistry::new(SubmitContext::new("s3://taxi-bucket/"));
        registry.register(
            "clean",
            JobEntry::SparkSubmit {
                script: "data_validation_cleaning.py".into(),
                py_files: Some("utils.zip".into()),
                spark_conf: conf,
            },
        );
        registry.register(
            "crawl",
            JobEntry::Crawler {
                crawler: "nyc-taxi-crawler".into(),
            },
        );
        registry
    }

    #[test]
    fn test_resolve_spark_submit() {
        let request = registry().resolve(&JobSpec::new("clean", "clean", 1)).unwrap();
        assert_eq!(request.job, "clean");
        assert_eq!(
            request.log_uri.as_deref(),
            Some("s3://taxi-bucket/logs/emr-serverless/")
        );
        match request.driver {
            JobDriver::SparkSubmit {
                entry_point,
                spark_submit_parameters,
                ..
            } => {
                assert_eq!(
                    entry_point,
                    "s3://taxi-bucket/code/pyspark/jobs/data_validation_cleaning.py"
                );
                assert_eq!(
                    spark_submit_parameters,
                    "--py-files s3://taxi-bucket/code/pyspark/utils.zip \
                     --conf spark.executor.cores=4 --conf spark.executor.memory=16g"
                );
            }
            other => panic!("unexpected driver: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_uses_entry_not_name() {
        let spec = JobSpec::new("crawl_raw", "catalog", 0).with_entry("crawl");
        let request = registry().resolve(&spec).unwrap();
        assert_eq!(request.job, "crawl_raw");
        assert_eq!(
            request.driver,
            JobDriver::Crawler {
                crawler: "nyc-taxi-crawler".into()
            }
        );
        assert!(request.log_uri.is_none());
    }

    #[test]
    fn test_resolve_unknown_entry() {
        let err = registry()
            .resolve(&JobSpec::new("ghost", "p", 0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EntryNotFound(name) if name == "ghost"));
    }
}
