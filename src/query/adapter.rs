use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{CancelSignal, PollSchedule, PollTick};

use super::dialect::rewrite_sql;
use super::error::QueryError;
use super::result::QueryResult;
use super::service::{QueryService, QueryState};

/// Caller-supplied result location, e.g. `s3://bucket/athena-results/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingLocation(String);

impl StagingLocation {
    pub fn parse(value: &str) -> Result<Self, QueryError> {
        let value = value.trim();
        let Some((scheme, rest)) = value.split_once("://") else {
            return Err(QueryError::InvalidStagingLocation(format!(
                "'{}' has no URI scheme",
                value
            )));
        };
        if scheme.is_empty() || rest.trim_matches('/').is_empty() {
            return Err(QueryError::InvalidStagingLocation(format!(
                "'{}' has no bucket or path",
                value
            )));
        }
        let mut normalized = value.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StagingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAdapterConfig {
    pub workgroup: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// `run` fails with `ResultTooLarge` beyond this many rows.
    pub max_result_rows: usize,
    pub rewrite_dialect: bool,
}

impl Default for QueryAdapterConfig {
    fn default() -> Self {
        Self {
            workgroup: "primary".to_string(),
            poll_interval_ms: 1_000,
            timeout_secs: 300,
            max_result_rows: 10_000,
            rewrite_dialect: true,
        }
    }
}

/// One page handed back by [`QueryExecutionAdapter::fetch`]. An empty
/// `next_cursor` means there is nothing more to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub next_cursor: String,
}

/// Adapter-side record of a submitted query.
#[derive(Debug, Clone)]
pub struct QueryRun {
    pub id: String,
    pub state: QueryState,
    pub staging: StagingLocation,
    pub reason: Option<String>,
    /// Token the next fetch must present; empty before the first page.
    cursor: String,
    /// Every token handed out so far; the service must never repeat one.
    issued: HashSet<String>,
    exhausted: bool,
}

impl QueryRun {
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

fn syntax_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)SYNTAX_ERROR|mismatched input|line \d+:\d+").ok())
        .as_ref()
}

fn size_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)too large|exceeds|exhausted resources").ok())
        .as_ref()
}

/// Map an engine failure reason onto the caller-facing taxonomy.
pub fn classify_failure(reason: &str) -> QueryError {
    let is_match = |re: Option<&'static Regex>| re.map(|re| re.is_match(reason)).unwrap_or(false);
    if is_match(syntax_re()) {
        QueryError::SyntaxError(reason.to_string())
    } else if is_match(size_re()) {
        QueryError::ResultTooLarge(reason.to_string())
    } else {
        QueryError::ExecutionFailed(reason.to_string())
    }
}

/// Submit/poll/fetch/cancel on top of a [`QueryService`].
pub struct QueryExecutionAdapter {
    service: Arc<dyn QueryService>,
    config: QueryAdapterConfig,
    runs: Mutex<HashMap<String, QueryRun>>,
}

impl QueryExecutionAdapter {
    pub fn new(service: Arc<dyn QueryService>, config: QueryAdapterConfig) -> Self {
        Self {
            service,
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_info(&self, query_id: &str) -> Option<QueryRun> {
        self.runs.lock().get(query_id).cloned()
    }

    /// Drop the adapter's record of a query. Later calls for it fail with
    /// `UnknownQuery`.
    pub fn forget(&self, query_id: &str) -> Option<QueryRun> {
        self.runs.lock().remove(query_id)
    }

    pub async fn submit(&self, sql: &str, staging: &StagingLocation) -> Result<String, QueryError> {
        let sql = if self.config.rewrite_dialect {
            rewrite_sql(sql)
        } else {
            sql.trim().to_string()
        };
        let query_id = self
            .service
            .start_query(&sql, staging.as_str(), &self.config.workgroup)
            .await?;
        tracing::info!(query_id = %query_id, staging = %staging, "Query submitted");

        self.runs.lock().insert(
            query_id.clone(),
            QueryRun {
                id: query_id.clone(),
                state: QueryState::Queued,
                staging: staging.clone(),
                reason: None,
                cursor: String::new(),
                issued: HashSet::new(),
                exhausted: false,
            },
        );
        Ok(query_id)
    }

    pub async fn poll(&self, query_id: &str) -> Result<QueryState, QueryError> {
        if let Some(state) = self.terminal_state(query_id)? {
            return Ok(state);
        }
        let status = self.service.get_status(query_id).await?;
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(query_id)
            .ok_or_else(|| QueryError::UnknownQuery(query_id.to_string()))?;
        if !run.state.is_terminal() {
            run.state = status.state;
            run.reason = status.reason;
        }
        Ok(run.state)
    }

    fn terminal_state(&self, query_id: &str) -> Result<Option<QueryState>, QueryError> {
        let runs = self.runs.lock();
        let run = runs
            .get(query_id)
            .ok_or_else(|| QueryError::UnknownQuery(query_id.to_string()))?;
        Ok(run.state.is_terminal().then_some(run.state))
    }

    /// Fetch the page at `cursor`.
    ///
    /// `cursor` must be the one returned by the previous fetch (empty for
    /// the first page). Once exhausted, the run returns no rows without
    /// touching the service.
    pub async fn fetch(&self, query_id: &str, cursor: &str) -> Result<FetchPage, QueryError> {
        {
            let runs = self.runs.lock();
            let run = runs
                .get(query_id)
                .ok_or_else(|| QueryError::UnknownQuery(query_id.to_string()))?;
            if run.state != QueryState::Succeeded {
                return Err(QueryError::NotReady {
                    query_id: query_id.to_string(),
                    state: run.state,
                });
            }
            if run.exhausted {
                return Ok(FetchPage::default());
            }
            if run.cursor != cursor {
                return Err(QueryError::StaleCursor {
                    query_id: query_id.to_string(),
                    expected: run.cursor.clone(),
                    got: cursor.to_string(),
                });
            }
        }

        let token = (!cursor.is_empty()).then_some(cursor);
        let page = self.service.get_results(query_id, token).await?;
        let next_cursor = page.next_token.clone().unwrap_or_default();

        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(query_id)
            .ok_or_else(|| QueryError::UnknownQuery(query_id.to_string()))?;
        // A concurrent fetch with the same cursor got here first.
        if run.cursor != cursor || run.exhausted {
            return Err(QueryError::StaleCursor {
                query_id: query_id.to_string(),
                expected: run.cursor.clone(),
                got: cursor.to_string(),
            });
        }
        if next_cursor.is_empty() {
            run.exhausted = true;
        } else if !run.issued.insert(next_cursor.clone()) {
            tracing::warn!(query_id = %query_id, token = %next_cursor, "Query service repeated a page token");
            return Err(QueryError::RepeatedCursor {
                query_id: query_id.to_string(),
                token: next_cursor,
            });
        }
        run.cursor = next_cursor.clone();

        Ok(FetchPage {
            columns: page.columns,
            rows: page.rows,
            next_cursor,
        })
    }

    /// Stop a query. A no-op once the query is terminal.
    pub async fn cancel(&self, query_id: &str) -> Result<(), QueryError> {
        if self.terminal_state(query_id)?.is_some() {
            return Ok(());
        }
        self.service.stop_query(query_id).await?;
        tracing::info!(query_id = %query_id, "Query cancelled");
        if let Some(run) = self.runs.lock().get_mut(query_id) {
            if !run.state.is_terminal() {
                run.state = QueryState::Cancelled;
            }
        }
        Ok(())
    }

    /// Poll until the query finishes, the deadline passes or `cancel` fires.
    ///
    /// Deadline expiry and caller cancellation both stop the query.
    pub async fn wait(&self, query_id: &str, cancel: &CancelSignal) -> Result<(), QueryError> {
        let mut schedule = PollSchedule::new(
            Duration::from_millis(self.config.poll_interval_ms),
            Some(Duration::from_secs(self.config.timeout_secs)),
        );
        loop {
            match schedule.next(cancel).await {
                PollTick::Probe => match self.poll(query_id).await {
                    Ok(QueryState::Succeeded) => return Ok(()),
                    Ok(QueryState::Failed) => {
                        let reason = self
                            .run_info(query_id)
                            .and_then(|r| r.reason)
                            .unwrap_or_else(|| "query failed".to_string());
                        tracing::warn!(query_id = %query_id, reason = %reason, "Query failed");
                        return Err(classify_failure(&reason));
                    }
                    Ok(QueryState::Cancelled) => {
                        let reason = self
                            .run_info(query_id)
                            .and_then(|r| r.reason)
                            .unwrap_or_else(|| "cancelled by the engine".to_string());
                        return Err(QueryError::Cancelled(reason));
                    }
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => {
                        tracing::debug!(query_id = %query_id, "Status check throttled");
                    }
                    Err(e) => return Err(e),
                },
                PollTick::DeadlineExceeded => {
                    self.cancel(query_id).await?;
                    return Err(QueryError::Timeout {
                        query_id: query_id.to_string(),
                        timeout_secs: self.config.timeout_secs,
                    });
                }
                PollTick::Cancelled => {
                    self.cancel(query_id).await?;
                    return Err(QueryError::Cancelled(
                        cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                    ));
                }
            }
        }
    }

    /// Submit, wait and read every page. The run is forgotten once this
    /// returns, whatever the outcome.
    pub async fn run(
        &self,
        sql: &str,
        staging: &StagingLocation,
        cancel: &CancelSignal,
    ) -> Result<QueryResult, QueryError> {
        let query_id = self.submit(sql, staging).await?;
        let result = self.collect(&query_id, cancel).await;
        self.forget(&query_id);
        result
    }

    async fn collect(&self, query_id: &str, cancel: &CancelSignal) -> Result<QueryResult, QueryError> {
        self.wait(query_id, cancel).await?;

        let mut result = QueryResult {
            query_id: query_id.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
        };
        let mut cursor = String::new();
        loop {
            let page = self.fetch(query_id, &cursor).await?;
            if result.columns.is_empty() {
                result.columns = page.columns;
            }
            result.rows.extend(page.rows);
            if result.rows.len() > self.config.max_result_rows {
                return Err(QueryError::ResultTooLarge(format!(
                    "more than {} rows",
                    self.config.max_result_rows
                )));
            }
            if page.next_cursor.is_empty() {
                break;
            }
            cursor = page.next_cursor;
        }
        tracing::info!(query_id = %query_id, rows = result.rows.len(), "Query results fetched");
        Ok(result)
    }
}
