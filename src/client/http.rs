use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::error::{ClientError, ClientResult};
use crate::jobs::JobRequest;

use super::{BatchJobClient, RemoteStatus};

/// Batch client for an HTTP job gateway fronting the compute service.
pub struct HttpBatchJobClient {
    client: reqwest::Client,
    endpoint: String,
    application_id: String,
    execution_role_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJobRunResponse {
    job_run_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetJobRunResponse {
    job_run: JobRunBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRunBody {
    state: String,
    #[serde(default)]
    state_details: Option<String>,
}

impl HttpBatchJobClient {
    pub fn new(config: &ServiceConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            application_id: config.application_id.clone(),
            execution_role_arn: config.execution_role_arn.clone(),
        })
    }

    fn runs_url(&self) -> String {
        format!(
            "{}/applications/{}/jobruns",
            self.endpoint, self.application_id
        )
    }

    fn run_url(&self, run_id: &str) -> String {
        format!("{}/{}", self.runs_url(), run_id)
    }

    async fn check(resp: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let retry_after = retry_after_secs(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after, body))
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Map a non-success gateway status onto the client error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
) -> ClientError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };
    if status == StatusCode::TOO_MANY_REQUESTS {
        ClientError::Throttled { retry_after_secs }
    } else if status.is_server_error() {
        ClientError::Transient(message)
    } else if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(message)
    } else {
        ClientError::Rejected(message)
    }
}

fn network_error(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.to_string())
}

#[async_trait]
impl BatchJobClient for HttpBatchJobClient {
    async fn submit(&self, request: &JobRequest) -> ClientResult<String> {
        let client_token = request
            .client_token
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let payload = serde_json::json!({
            "name": request.job,
            "executionRoleArn": self.execution_role_arn,
            "jobDriver": request.driver,
            "logUri": request.log_uri,
            "clientToken": client_token,
        });

        let resp = self
            .client
            .post(self.runs_url())
            .json(&payload)
            .send()
            .await
            .map_err(network_error)?;
        let resp = Self::check(resp).await?;
        let body: StartJobRunResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(body.job_run_id)
    }

    async fn describe(&self, run_id: &str) -> ClientResult<RemoteStatus> {
        let resp = self
            .client
            .get(self.run_url(run_id))
            .send()
            .await
            .map_err(network_error)?;
        let resp = Self::check(resp).await?;
        let body: GetJobRunResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(RemoteStatus {
            state: body.job_run.state,
            message: body.job_run.state_details.filter(|s| !s.is_empty()),
        })
    }

    async fn cancel(&self, run_id: &str) -> ClientResult<()> {
        let resp = self
            .client
            .delete(self.run_url(run_id))
            .send()
            .await
            .map_err(network_error)?;
        // 409: run already finished.
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(7), String::new()),
            ClientError::Throttled {
                retry_after_secs: Some(7)
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "busy".into()),
            ClientError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None, String::new()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "bad role".into()),
            ClientError::Rejected(m) if m.contains("bad role")
        ));
    }

    #[test]
    fn test_urls() {
        let config = ServiceConfig {
            endpoint: "https://gateway.local/".into(),
            application_id: "app-1".into(),
            execution_role_arn: "arn:role".into(),
            bucket: "b".into(),
            ..ServiceConfig::default()
        };
        let client = HttpBatchJobClient::new(&config).unwrap();
        assert_eq!(
            client.run_url("r1"),
            "https://gateway.local/applications/app-1/jobruns/r1"
        );
    }

    #[test]
    fn test_parse_get_job_run() {
        let body: GetJobRunResponse = serde_json::from_str(
            r#"{"jobRun":{"jobRunId":"r1","state":"FAILED","stateDetails":"OOM"}}"#,
        )
        .unwrap();
        assert_eq!(body.job_run.state, "FAILED");
        assert_eq!(body.job_run.state_details.as_deref(), Some("OOM"));
    }
}
