use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ServiceConfig;
use crate::dsl::ArtifactSchema;
use crate::error::{ClientError, ClientResult, PipelineError, PipelineResult};

use super::http::classify_status;

/// Pushes local code artifacts to the bucket the jobs read from.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, local_path: &Path, key: &str) -> ClientResult<()>;
}

/// Upload every artifact in order, stopping at the first failure.
pub async fn upload_artifacts(
    uploader: &dyn ArtifactUploader,
    artifacts: &[ArtifactSchema],
) -> PipelineResult<usize> {
    for artifact in artifacts {
        tracing::info!(path = %artifact.path, key = %artifact.key, "Uploading artifact");
        uploader
            .upload(Path::new(&artifact.path), &artifact.key)
            .await
            .map_err(|e| PipelineError::UploadFailed(format!("{}: {}", artifact.path, e)))?;
    }
    Ok(artifacts.len())
}

/// `PUT {endpoint}/buckets/{bucket}/objects/{key}` against the gateway.
pub struct HttpArtifactUploader {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl HttpArtifactUploader {
    pub fn new(config: &ServiceConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ArtifactUploader for HttpArtifactUploader {
    async fn upload(&self, local_path: &Path, key: &str) -> ClientResult<()> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| ClientError::Rejected(format!("read {}: {}", local_path.display(), e)))?;
        let url = format!(
            "{}/buckets/{}/objects/{}",
            self.endpoint,
            self.bucket,
            key.trim_start_matches('/')
        );
        let resp = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, None, body))
    }
}

/// In-memory uploader recording object sizes by key.
#[derive(Debug, Default)]
pub struct MemoryArtifactUploader {
    objects: Mutex<BTreeMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryArtifactUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads to `key` fail.
    pub fn fail_on(self, key: &str) -> Self {
        self.failing.lock().insert(key.to_string());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn size_of(&self, key: &str) -> Option<usize> {
        self.objects.lock().get(key).copied()
    }
}

#[async_trait]
impl ArtifactUploader for MemoryArtifactUploader {
    async fn upload(&self, local_path: &Path, key: &str) -> ClientResult<()> {
        if self.failing.lock().contains(key) {
            return Err(ClientError::Rejected(format!("access denied: {}", key)));
        }
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| ClientError::Rejected(format!("read {}: {}", local_path.display(), e)))?;
        self.objects.lock().insert(key.to_string(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_artifacts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("clean.py");
        std::fs::write(&script, b"print('clean')").unwrap();

        let uploader = MemoryArtifactUploader::new();
        let artifacts = vec![ArtifactSchema {
            path: script.display().to_string(),
            key: "code/pyspark/jobs/clean.py".into(),
        }];
        let n = upload_artifacts(&uploader, &artifacts).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(uploader.size_of("code/pyspark/jobs/clean.py"), Some(14));
    }

    #[tokio::test]
    async fn test_upload_failure_stops() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let uploader = MemoryArtifactUploader::new().fail_on("code/a.py");
        let artifacts = vec![
            ArtifactSchema {
                path: a.display().to_string(),
                key: "code/a.py".into(),
            },
            ArtifactSchema {
                path: b.display().to_string(),
                key: "code/b.py".into(),
            },
        ];
        let err = upload_artifacts(&uploader, &artifacts).await.unwrap_err();
        assert!(matches!(err, PipelineError::UploadFailed(_)));
        assert!(uploader.keys().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let uploader = MemoryArtifactUploader::new();
        assert!(uploader
            .upload(Path::new("/no/such/file.zip"), "code/utils.zip")
            .await
            .is_err());
    }
}
