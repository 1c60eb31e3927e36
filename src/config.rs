//! Service connection settings for the job gateway.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::jobs::SubmitContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the job gateway.
    pub endpoint: String,
    pub application_id: String,
    pub execution_role_arn: String,
    pub bucket: String,
    pub code_prefix: String,
    pub log_prefix: String,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            application_id: String::new(),
            execution_role_arn: String::new(),
            bucket: String::new(),
            code_prefix: "code/pyspark".to_string(),
            log_prefix: "logs/emr-serverless".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Fail with every missing required key listed at once.
    pub fn validate(&self) -> PipelineResult<()> {
        let required = [
            ("BATCHFLOW_ENDPOINT", &self.endpoint),
            ("EMR_APPLICATION_ID", &self.application_id),
            ("EMR_EXECUTION_ROLE_ARN", &self.execution_role_arn),
            ("S3_BUCKET_NAME", &self.bucket),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "Missing required config: {}",
                missing.join(", ")
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn submit_context(&self) -> SubmitContext {
        let bucket = if self.bucket.contains("://") {
            self.bucket.clone()
        } else {
            format!("s3://{}", self.bucket)
        };
        SubmitContext::new(bucket).with_prefixes(&self.code_prefix, &self.log_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_lists_all_missing() {
        let config = ServiceConfig {
            endpoint: "http://localhost:8080".into(),
            ..ServiceConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required config: \
             EMR_APPLICATION_ID, EMR_EXECUTION_ROLE_ARN, S3_BUCKET_NAME"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_submit_context_adds_scheme() {
        let config = ServiceConfig {
            bucket: "taxi".into(),
            ..ServiceConfig::default()
        };
        let ctx = config.submit_context();
        assert_eq!(ctx.bucket_uri, "s3://taxi");
        assert_eq!(ctx.code_prefix, "code/pyspark");
    }
}
