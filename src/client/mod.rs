//! Batch Job Client boundary.
//!
//! [`BatchJobClient`] is the submit/describe/cancel surface of the managed
//! compute service. [`HttpBatchJobClient`] talks to a job gateway over HTTP;
//! [`ScriptedBatchJobClient`] replays scripted state sequences in tests.
//! Artifact upload lives here as well since it targets the same gateway.

mod http;
mod memory;
mod uploader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::jobs::JobRequest;

pub use http::HttpBatchJobClient;
pub use memory::{ClientCall, ScriptedBatchJobClient};
pub use uploader::{
    upload_artifacts, ArtifactUploader, HttpArtifactUploader, MemoryArtifactUploader,
};

/// Status reported by the batch service for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    /// Service state string, e.g. `RUNNING` or `SUCCESS`.
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RemoteStatus {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[async_trait]
pub trait BatchJobClient: Send + Sync {
    /// Submit a job, returning the service's run id.
    async fn submit(&self, request: &JobRequest) -> ClientResult<String>;

    async fn describe(&self, run_id: &str) -> ClientResult<RemoteStatus>;

    /// Request cancellation. Cancelling a finished run is not an error.
    async fn cancel(&self, run_id: &str) -> ClientResult<()>;
}
