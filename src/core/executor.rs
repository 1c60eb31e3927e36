//! Job graph executor.
//!
//! Phases run strictly in ordinal order. Inside a phase, jobs are spawned on a
//! [`JoinSet`] and bounded by a [`Semaphore`] of `max_concurrency` permits.
//! A blocking phase is drained completely before the next one is admitted and
//! any failure in it aborts the graph; a parallel phase isolates failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::client::BatchJobClient;
use crate::core::cancel::CancelSignal;
use crate::core::event_bus::ExecutorEvent;
use crate::core::poller::{PollSchedule, PollTick};
use crate::core::retry::{submit_with_retry, SubmitFailure};
use crate::core::runtime_context::RuntimeContext;
use crate::domain::execution::{GraphReport, JobRun, JobState, OverallStatus};
use crate::dsl::schema::ExecutorConfig;
use crate::error::{ClientError, ErrorCode};
use crate::graph::{JobGraph, Phase};
use crate::jobs::JobRegistry;

/// State shared by every job task of one execution.
struct Shared {
    client: Arc<dyn BatchJobClient>,
    registry: Arc<JobRegistry>,
    config: ExecutorConfig,
    context: RuntimeContext,
    root_cancel: CancelSignal,
}

impl Shared {
    fn cancel_reason(&self, local: &CancelSignal) -> String {
        self.root_cancel
            .reason()
            .or_else(|| local.reason())
            .unwrap_or_else(|| "cancelled".to_string())
    }
}

pub struct JobGraphExecutor {
    client: Arc<dyn BatchJobClient>,
    registry: Arc<JobRegistry>,
    config: ExecutorConfig,
    context: RuntimeContext,
    cancel: CancelSignal,
}

impl JobGraphExecutor {
    pub fn new(
        client: Arc<dyn BatchJobClient>,
        registry: JobRegistry,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            registry: Arc::new(registry),
            config,
            context: RuntimeContext::default(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_context(mut self, context: RuntimeContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Signal that aborts the run when triggered.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub async fn execute(&self, graph: &JobGraph) -> GraphReport {
        let shared = Arc::new(Shared {
            client: self.client.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            context: self.context.clone(),
            root_cancel: self.cancel.clone(),
        });
        let ctx = &self.context;

        let mut runs: HashMap<String, JobRun> = graph
            .jobs()
            .map(|spec| {
                (
                    spec.name.clone(),
                    JobRun::new(ctx.id_generator.next_id(), spec.clone()),
                )
            })
            .collect();

        let mut abort_reason: Option<String> = None;

        for phase in graph.phases() {
            if abort_reason.is_none() && self.cancel.is_triggered() {
                abort_reason = Some(shared.cancel_reason(&self.cancel));
            }
            if let Some(reason) = &abort_reason {
                for spec in &phase.jobs {
                    if let Some(run) = runs.get_mut(&spec.name) {
                        mark_not_submitted(run, ctx, &format!("not submitted: {}", reason));
                    }
                }
                continue;
            }

            let failed = self.run_phase(&shared, graph, phase, &mut runs).await;

            if self.cancel.is_triggered() {
                abort_reason = Some(shared.cancel_reason(&self.cancel));
            } else if phase.is_blocking() && failed > 0 {
                abort_reason = Some(format!("blocking phase '{}' failed", phase.name));
            }
            if let Some(reason) = &abort_reason {
                tracing::warn!(phase = %phase.name, reason = %reason, "Aborting graph run");
                ctx.emit(ExecutorEvent::GraphAborted {
                    reason: reason.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        let jobs: Vec<_> = graph
            .jobs()
            .filter_map(|spec| runs.get(&spec.name).map(JobRun::to_report))
            .collect();

        let status = if abort_reason.is_some() {
            OverallStatus::Aborted
        } else if jobs
            .iter()
            .any(|j| j.state.is_failure() || j.state == JobState::NotSubmitted)
        {
            OverallStatus::PartialFailure
        } else {
            OverallStatus::Success
        };

        tracing::info!(status = ?status, jobs = jobs.len(), "Graph run finished");
        ctx.emit(ExecutorEvent::GraphCompleted {
            status,
            timestamp: chrono::Utc::now(),
        });

        GraphReport {
            status,
            jobs,
            abort_reason,
        }
    }

    /// Run every job of `phase` and wait for all tasks. Returns the number
    /// of failed jobs.
    async fn run_phase(
        &self,
        shared: &Arc<Shared>,
        graph: &JobGraph,
        phase: &Phase,
        runs: &mut HashMap<String, JobRun>,
    ) -> usize {
        let ctx = &shared.context;
        tracing::info!(
            phase = %phase.name,
            ordinal = phase.ordinal,
            gating = ?phase.gating,
            jobs = phase.jobs.len(),
            "Starting phase"
        );
        ctx.emit(ExecutorEvent::PhaseStarted {
            phase: phase.name.clone(),
            ordinal: phase.ordinal,
            timestamp: chrono::Utc::now(),
        });

        let phase_cancel = self.cancel.child();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for spec in &phase.jobs {
            let blocked_by = spec.depends_on.iter().find(|dep| {
                runs.get(dep.as_str())
                    .map(|r| r.state != JobState::Succeeded)
                    .unwrap_or(false)
            });
            if let Some(dep) = blocked_by {
                let message = format!("dependency '{}' did not succeed", dep);
                if let Some(run) = runs.get_mut(&spec.name) {
                    mark_not_submitted(run, ctx, &message);
                }
                continue;
            }

            let Some(run) = runs.remove(&spec.name) else {
                continue;
            };
            let wait = phase.is_blocking()
                || self.config.wait
                || graph.has_dependents(&spec.name);
            tasks.spawn(run_job(
                shared.clone(),
                run,
                permits.clone(),
                phase_cancel.clone(),
                wait,
            ));
        }

        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            let run = match joined {
                Ok(run) => run,
                Err(e) => {
                    tracing::error!(phase = %phase.name, error = %e, "Job task panicked");
                    continue;
                }
            };
            if run.state.is_failure() {
                failed += 1;
                if phase.is_blocking() && !phase_cancel.is_triggered() {
                    tracing::warn!(
                        phase = %phase.name,
                        job = %run.name(),
                        "Job failed in blocking phase, cancelling siblings"
                    );
                    phase_cancel.trigger(format!(
                        "job '{}' failed in blocking phase '{}'",
                        run.name(),
                        phase.name
                    ));
                }
            }
            runs.insert(run.name().to_string(), run);
        }

        // Tasks that panicked never returned their run.
        for spec in &phase.jobs {
            if !runs.contains_key(&spec.name) {
                let mut run = JobRun::new(ctx.id_generator.next_id(), spec.clone());
                finish(
                    &mut run,
                    ctx,
                    JobState::Failed,
                    Some(ErrorCode::InternalError),
                    "job task panicked".to_string(),
                );
                failed += 1;
                runs.insert(spec.name.clone(), run);
            }
        }

        ctx.emit(ExecutorEvent::PhaseCompleted {
            phase: phase.name.clone(),
            failed,
            timestamp: chrono::Utc::now(),
        });
        failed
    }
}

async fn run_job(
    shared: Arc<Shared>,
    mut run: JobRun,
    permits: Arc<Semaphore>,
    cancel: CancelSignal,
    wait: bool,
) -> JobRun {
    let ctx = &shared.context;

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let reason = shared.cancel_reason(&cancel);
            mark_not_submitted(&mut run, ctx, &format!("not submitted: {}", reason));
            return run;
        }
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                finish(&mut run, ctx, JobState::Failed, Some(ErrorCode::InternalError), e.to_string());
                return run;
            }
        },
    };

    let request = match shared.registry.resolve(&run.spec) {
        Ok(request) => request.with_client_token(run.id.clone()),
        Err(e) => {
            finish(&mut run, ctx, JobState::Failed, Some(ErrorCode::ConfigError), e.to_string());
            return run;
        }
    };

    let run_id = match submit_with_retry(
        shared.client.as_ref(),
        &request,
        &shared.config.retry,
        &cancel,
        ctx,
    )
    .await
    {
        Ok((run_id, attempts)) => {
            run.attempts = attempts;
            run.remote_run_id = Some(run_id.clone());
            set_state(&mut run, ctx, JobState::Submitted);
            tracing::info!(job = %run.name(), run_id = %run_id, attempts, "Job submitted");
            ctx.emit(ExecutorEvent::JobSubmitted {
                job: run.name().to_string(),
                run_id: run_id.clone(),
                attempts,
                timestamp: chrono::Utc::now(),
            });
            run_id
        }
        Err(SubmitFailure::Failed { error, attempts }) => {
            run.attempts = attempts;
            finish(&mut run, ctx, JobState::Failed, Some(error.error_code()), error.to_string());
            return run;
        }
        Err(SubmitFailure::Cancelled { attempts }) => {
            run.attempts = attempts;
            let reason = shared.cancel_reason(&cancel);
            mark_not_submitted(&mut run, ctx, &format!("not submitted: {}", reason));
            return run;
        }
    };

    if !wait {
        tracing::info!(job = %run.name(), run_id = %run_id, "Not waiting for completion");
        return run;
    }

    let timeout = run
        .spec
        .timeout
        .unwrap_or_else(|| Duration::from_secs(shared.config.job_timeout_secs));
    let mut schedule = PollSchedule::new(
        Duration::from_millis(shared.config.poll_interval_ms),
        Some(timeout),
    );

    loop {
        match schedule.next(&cancel).await {
            PollTick::Probe => match shared.client.describe(&run_id).await {
                Ok(status) => {
                    let state = JobState::from_remote(&status.state);
                    tracing::debug!(job = %run.name(), remote = %status.state, "Polled job");
                    if state.is_terminal() {
                        let code = match state {
                            JobState::Failed => Some(ErrorCode::ExecutionFailure),
                            JobState::Cancelled => Some(ErrorCode::Cancelled),
                            _ => None,
                        };
                        finish(&mut run, ctx, state, code, status.message.unwrap_or_default());
                        break;
                    }
                    if state != run.state && run.state.can_transition_to(state) {
                        set_state(&mut run, ctx, state);
                    }
                }
                Err(ClientError::NotFound(msg)) => {
                    finish(
                        &mut run,
                        ctx,
                        JobState::Failed,
                        Some(ErrorCode::ExecutionFailure),
                        format!("run disappeared: {}", msg),
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(job = %run.name(), error = %e, "Describe failed, will poll again");
                }
            },
            PollTick::DeadlineExceeded => {
                cancel_remote(&shared, &run, &run_id).await;
                finish(
                    &mut run,
                    ctx,
                    JobState::TimedOut,
                    Some(ErrorCode::Timeout),
                    format!("deadline of {}s exceeded", timeout.as_secs()),
                );
                ctx.emit(ExecutorEvent::JobTimedOut {
                    job: run.name().to_string(),
                    run_id: run_id.clone(),
                    timestamp: chrono::Utc::now(),
                });
                break;
            }
            PollTick::Cancelled => {
                let reason = shared.cancel_reason(&cancel);
                cancel_remote(&shared, &run, &run_id).await;
                finish(
                    &mut run,
                    ctx,
                    JobState::Cancelled,
                    Some(ErrorCode::Cancelled),
                    reason.clone(),
                );
                ctx.emit(ExecutorEvent::JobCancelled {
                    job: run.name().to_string(),
                    run_id: run_id.clone(),
                    reason,
                    timestamp: chrono::Utc::now(),
                });
                break;
            }
        }
    }

    run
}

/// Issue the one Cancel call for a run. Errors are logged, not retried.
async fn cancel_remote(shared: &Shared, run: &JobRun, run_id: &str) {
    tracing::info!(job = %run.name(), run_id = %run_id, "Cancelling job run");
    if let Err(e) = shared.client.cancel(run_id).await {
        tracing::warn!(job = %run.name(), run_id = %run_id, error = %e, "Cancel request failed");
    }
}

fn set_state(run: &mut JobRun, ctx: &RuntimeContext, state: JobState) {
    match run.transition(state, ctx.now_millis()) {
        Ok(()) => ctx.emit(ExecutorEvent::JobStateChanged {
            job: run.name().to_string(),
            state,
            timestamp: chrono::Utc::now(),
        }),
        Err(e) => tracing::error!(error = %e, "Rejected job state change"),
    }
}

fn finish(
    run: &mut JobRun,
    ctx: &RuntimeContext,
    state: JobState,
    code: Option<ErrorCode>,
    message: String,
) {
    match run.finish_with(state, code, message, ctx.now_millis()) {
        Ok(()) => {
            if state == JobState::Succeeded {
                tracing::info!(job = %run.name(), "Job succeeded");
            } else {
                tracing::warn!(
                    job = %run.name(),
                    state = %state,
                    message = run.message.as_deref().unwrap_or(""),
                    "Job finished"
                );
            }
            ctx.emit(ExecutorEvent::JobStateChanged {
                job: run.name().to_string(),
                state,
                timestamp: chrono::Utc::now(),
            });
        }
        Err(e) => tracing::error!(error = %e, "Rejected job state change"),
    }
}

fn mark_not_submitted(run: &mut JobRun, ctx: &RuntimeContext, message: &str) {
    finish(
        run,
        ctx,
        JobState::NotSubmitted,
        Some(ErrorCode::DependencyAbort),
        message.to_string(),
    );
}
