use std::time::Duration;

use crate::client::BatchJobClient;
use crate::core::cancel::CancelSignal;
use crate::core::event_bus::ExecutorEvent;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::schema::{BackoffStrategy, RetryConfig};
use crate::error::ClientError;
use crate::jobs::JobRequest;

/// Why a submission never produced a run id.
#[derive(Debug)]
pub enum SubmitFailure {
    /// Non-transient error, or retries exhausted.
    Failed { error: ClientError, attempts: u32 },
    /// Cancelled while waiting to retry.
    Cancelled { attempts: u32 },
}

/// Delay before retry number `attempt` (0-based), in milliseconds.
///
/// A throttling response that names a retry-after wins over the policy.
pub fn calculate_retry_interval(rc: &RetryConfig, attempt: u32, error: &ClientError) -> u64 {
    if let Some(retry_after) = error.retry_after_secs() {
        return retry_after * 1000;
    }

    let base = rc.retry_interval;
    let exp = attempt.min(i32::MAX as u32) as i32;
    let interval = match rc.backoff_strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Exponential => {
            let multiplied = base as f64 * rc.backoff_multiplier.powi(exp);
            multiplied as u64
        }
        BackoffStrategy::ExponentialWithJitter => {
            let multiplied = base as f64 * rc.backoff_multiplier.powi(exp);
            let jitter = rand::random::<f64>() * multiplied * 0.1;
            (multiplied + jitter) as u64
        }
    };

    interval.min(rc.max_retry_interval)
}

/// Submit `request`, retrying transient errors with backoff.
///
/// Returns the run id and the number of submit calls made.
pub async fn submit_with_retry(
    client: &dyn BatchJobClient,
    request: &JobRequest,
    rc: &RetryConfig,
    cancel: &CancelSignal,
    context: &RuntimeContext,
) -> Result<(String, u32), SubmitFailure> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let error = match client.submit(request).await {
            Ok(run_id) => return Ok((run_id, attempts)),
            Err(e) => e,
        };

        let retries_used = attempts - 1;
        if !error.is_transient() || retries_used >= rc.max_retries {
            tracing::warn!(
                job = %request.job,
                attempts,
                error = %error,
                "Submission failed"
            );
            return Err(SubmitFailure::Failed { error, attempts });
        }

        let delay_ms = calculate_retry_interval(rc, retries_used, &error);
        tracing::info!(
            job = %request.job,
            attempt = attempts,
            delay_ms,
            error = %error,
            "Transient submission error, retrying"
        );
        context.emit(ExecutorEvent::JobRetry {
            job: request.job.clone(),
            attempt: attempts,
            delay_ms,
            error: error.to_string(),
        });

        tokio::select! {
            _ = cancel.cancelled() => return Err(SubmitFailure::Cancelled { attempts }),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedBatchJobClient;
    use crate::jobs::JobDriver;

    fn rc(strategy: BackoffStrategy) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            retry_interval: 100,
            backoff_strategy: strategy,
            backoff_multiplier: 2.0,
            max_retry_interval: 1_000,
        }
    }

    fn request(job: &str) -> JobRequest {
        JobRequest {
            job: job.into(),
            driver: JobDriver::Crawler {
                crawler: job.into(),
            },
            log_uri: None,
            client_token: None,
        }
    }

    #[test]
    fn test_interval_strategies() {
        let err = ClientError::Transient("503".into());
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Fixed), 3, &err), 100);
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Exponential), 0, &err), 100);
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Exponential), 2, &err), 400);
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Exponential), 9, &err), 1_000);

        let jittered = calculate_retry_interval(&rc(BackoffStrategy::ExponentialWithJitter), 1, &err);
        assert!((200..=220).contains(&jittered));
    }

    #[test]
    fn test_retry_after_overrides_policy() {
        let err = ClientError::Throttled {
            retry_after_secs: Some(5),
        };
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Fixed), 0, &err), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let client = ScriptedBatchJobClient::new().transient_submits("lookup", 2);
        let (run_id, attempts) = submit_with_retry(
            &client,
            &request("lookup"),
            &rc(BackoffStrategy::Exponential),
            &CancelSignal::new(),
            &RuntimeContext::default(),
        )
        .await
        .unwrap();
        assert!(!run_id.is_empty());
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let client = ScriptedBatchJobClient::new().throttle_submits("lookup", 10, None);
        let err = submit_with_retry(
            &client,
            &request("lookup"),
            &rc(BackoffStrategy::Fixed),
            &CancelSignal::new(),
            &RuntimeContext::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SubmitFailure::Failed { attempts: 4, .. }));
        assert_eq!(client.submit_attempts("lookup"), 4);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let client = ScriptedBatchJobClient::new().rejects("clean");
        let err = submit_with_retry(
            &client,
            &request("clean"),
            &rc(BackoffStrategy::Fixed),
            &CancelSignal::new(),
            &RuntimeContext::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SubmitFailure::Failed {
                error: ClientError::Rejected(_),
                attempts: 1
            }
        ));
    }
}
