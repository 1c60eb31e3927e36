use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::jobs::JobRequest;

use super::{BatchJobClient, RemoteStatus};

/// One recorded call against a [`ScriptedBatchJobClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Submit(String),
    Describe(String),
    Cancel(String),
}

#[derive(Debug, Clone)]
struct JobScript {
    /// Errors returned by successive submit calls before one succeeds.
    submit_errors: VecDeque<ScriptedError>,
    /// Errors returned by successive describe calls before statuses flow.
    describe_errors: VecDeque<ScriptedError>,
    /// Statuses returned by successive describe calls; the last repeats.
    states: Vec<RemoteStatus>,
}

impl Default for JobScript {
    fn default() -> Self {
        Self {
            submit_errors: VecDeque::new(),
            describe_errors: VecDeque::new(),
            states: vec![RemoteStatus::new("RUNNING"), RemoteStatus::new("SUCCESS")],
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptedError {
    Throttled(Option<u64>),
    Transient,
    Rejected,
    NotFound,
}

impl ScriptedError {
    fn into_error(self, job: &str) -> ClientError {
        match self {
            ScriptedError::Throttled(retry_after_secs) => ClientError::Throttled { retry_after_secs },
            ScriptedError::Transient => ClientError::Transient(format!("{} unavailable", job)),
            ScriptedError::Rejected => ClientError::Rejected(format!("{} rejected", job)),
            ScriptedError::NotFound => ClientError::NotFound(job.to_string()),
        }
    }
}

#[derive(Debug)]
struct RunState {
    job: String,
    cursor: usize,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<String, JobScript>,
    runs: HashMap<String, RunState>,
    calls: Vec<ClientCall>,
    tokens: Vec<(String, Option<String>)>,
    next_id: u64,
}

/// In-memory batch client replaying per-job scripts.
///
/// Jobs without a script run once and succeed. A cancelled run reports
/// `CANCELLED` from then on.
#[derive(Debug, Default)]
pub struct ScriptedBatchJobClient {
    inner: Mutex<Inner>,
}

impl ScriptedBatchJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script(self, job: &str, f: impl FnOnce(&mut JobScript)) -> Self {
        {
            let mut inner = self.inner.lock();
            f(inner.scripts.entry(job.to_string()).or_default());
        }
        self
    }

    /// Remote states returned by successive describe calls for `job`.
    pub fn states(self, job: &str, states: &[&str]) -> Self {
        self.with_script(job, |s| {
            s.states = states.iter().map(|st| RemoteStatus::new(*st)).collect();
        })
    }

    /// The job runs and then fails with `message`.
    pub fn fails(self, job: &str, message: &str) -> Self {
        self.with_script(job, |s| {
            s.states = vec![
                RemoteStatus::new("RUNNING"),
                RemoteStatus::new("FAILED").with_message(message),
            ];
        })
    }

    /// The job never leaves `RUNNING` unless cancelled.
    pub fn hangs(self, job: &str) -> Self {
        self.states(job, &["RUNNING"])
    }

    /// The first `n` submits of `job` are throttled.
    pub fn throttle_submits(self, job: &str, n: usize, retry_after_secs: Option<u64>) -> Self {
        self.with_script(job, |s| {
            s.submit_errors
                .extend(std::iter::repeat(ScriptedError::Throttled(retry_after_secs)).take(n));
        })
    }

    /// The first `n` submits of `job` fail with a transient service error.
    pub fn transient_submits(self, job: &str, n: usize) -> Self {
        self.with_script(job, |s| {
            s.submit_errors
                .extend(std::iter::repeat(ScriptedError::Transient).take(n));
        })
    }

    /// Every submit of `job` is rejected.
    pub fn rejects(self, job: &str) -> Self {
        self.with_script(job, |s| {
            s.submit_errors = std::iter::repeat(ScriptedError::Rejected).take(64).collect();
        })
    }

    /// The first `n` describes of `job` fail transiently.
    pub fn flaky_describes(self, job: &str, n: usize) -> Self {
        self.with_script(job, |s| {
            s.describe_errors
                .extend(std::iter::repeat(ScriptedError::Transient).take(n));
        })
    }

    /// The run disappears on the service side.
    pub fn vanishes(self, job: &str) -> Self {
        self.with_script(job, |s| {
            s.describe_errors = std::iter::repeat(ScriptedError::NotFound).take(64).collect();
        })
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.inner.lock().calls.clone()
    }

    /// Jobs successfully submitted, in submission order.
    pub fn submitted(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut runs: Vec<_> = inner.runs.iter().collect();
        runs.sort_by_key(|(id, _)| run_seq(id));
        runs.into_iter().map(|(_, r)| r.job.clone()).collect()
    }

    pub fn was_submitted(&self, job: &str) -> bool {
        self.inner.lock().runs.values().any(|r| r.job == job)
    }

    /// Submit calls for `job`, including failed attempts.
    pub fn submit_attempts(&self, job: &str) -> usize {
        self.count(|c| matches!(c, ClientCall::Submit(j) if j == job))
    }

    /// Client tokens sent by each submit call for `job`, in call order.
    pub fn submit_tokens(&self, job: &str) -> Vec<Option<String>> {
        self.inner
            .lock()
            .tokens
            .iter()
            .filter(|(j, _)| j == job)
            .map(|(_, token)| token.clone())
            .collect()
    }

    pub fn cancel_count(&self, job: &str) -> usize {
        self.count(|c| matches!(c, ClientCall::Cancel(j) if j == job))
    }

    fn count(&self, pred: impl Fn(&ClientCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

fn run_seq(run_id: &str) -> u64 {
    run_id
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[async_trait]
impl BatchJobClient for ScriptedBatchJobClient {
    async fn submit(&self, request: &JobRequest) -> ClientResult<String> {
        let mut inner = self.inner.lock();
        inner.calls.push(ClientCall::Submit(request.job.clone()));
        inner
            .tokens
            .push((request.job.clone(), request.client_token.clone()));

        let script = inner.scripts.entry(request.job.clone()).or_default();
        if let Some(err) = script.submit_errors.pop_front() {
            return Err(err.into_error(&request.job));
        }

        inner.next_id += 1;
        let run_id = format!("run-{}", inner.next_id);
        inner.runs.insert(
            run_id.clone(),
            RunState {
                job: request.job.clone(),
                cursor: 0,
                cancelled: false,
            },
        );
        Ok(run_id)
    }

    async fn describe(&self, run_id: &str) -> ClientResult<RemoteStatus> {
        let mut inner = self.inner.lock();
        let Inner {
            scripts,
            runs,
            calls,
            ..
        } = &mut *inner;

        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| ClientError::NotFound(run_id.to_string()))?;
        calls.push(ClientCall::Describe(run.job.clone()));

        if run.cancelled {
            return Ok(RemoteStatus::new("CANCELLED"));
        }

        let script = scripts.entry(run.job.clone()).or_default();
        if let Some(err) = script.describe_errors.pop_front() {
            return Err(err.into_error(&run.job));
        }

        let idx = run.cursor.min(script.states.len().saturating_sub(1));
        run.cursor += 1;
        Ok(script
            .states
            .get(idx)
            .cloned()
            .unwrap_or_else(|| RemoteStatus::new("SUCCESS")))
    }

    async fn cancel(&self, run_id: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| ClientError::NotFound(run_id.to_string()))?;
        run.cancelled = true;
        let job = run.job.clone();
        inner.calls.push(ClientCall::Cancel(job));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobDriver;

    fn request(job: &str) -> JobRequest {
        JobRequest {
            job: job.to_string(),
            driver: JobDriver::Crawler {
                crawler: job.to_string(),
            },
            log_uri: None,
            client_token: None,
        }
    }

    #[tokio::test]
    async fn test_default_script_succeeds() {
        let client = ScriptedBatchJobClient::new();
        let run = client.submit(&request("a")).await.unwrap();
        assert_eq!(client.describe(&run).await.unwrap().state, "RUNNING");
        assert_eq!(client.describe(&run).await.unwrap().state, "SUCCESS");
        assert_eq!(client.describe(&run).await.unwrap().state, "SUCCESS");
    }

    #[tokio::test]
    async fn test_throttled_then_accepted() {
        let client = ScriptedBatchJobClient::new().throttle_submits("a", 2, Some(1));
        assert!(client.submit(&request("a")).await.is_err());
        assert!(client.submit(&request("a")).await.is_err());
        assert!(client.submit(&request("a")).await.is_ok());
        assert_eq!(client.submit_attempts("a"), 3);
        assert_eq!(client.submitted(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_cancel_reports_cancelled() {
        let client = ScriptedBatchJobClient::new().hangs("a");
        let run = client.submit(&request("a")).await.unwrap();
        assert_eq!(client.describe(&run).await.unwrap().state, "RUNNING");
        client.cancel(&run).await.unwrap();
        assert_eq!(client.describe(&run).await.unwrap().state, "CANCELLED");
        assert_eq!(client.cancel_count("a"), 1);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let client = ScriptedBatchJobClient::new();
        assert!(matches!(
            client.describe("nope").await,
            Err(ClientError::NotFound(_))
        ));
    }
}
