use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::QueryError;
use super::service::{QueryService, QueryState, QueryStatus, ResultPage};

/// Behaviour of one query run by a [`MemoryQueryService`].
#[derive(Debug, Clone)]
pub struct ScriptedQuery {
    /// Non-terminal polls reported before `outcome`.
    running_polls: usize,
    outcome: Option<QueryStatus>,
    columns: Vec<String>,
    pages: Vec<Vec<Vec<String>>>,
    /// Page the last page points back to instead of ending.
    loop_to: Option<usize>,
}

impl ScriptedQuery {
    pub fn succeeded() -> Self {
        Self {
            running_polls: 0,
            outcome: Some(QueryStatus::new(QueryState::Succeeded)),
            columns: Vec::new(),
            pages: vec![Vec::new()],
            loop_to: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            outcome: Some(QueryStatus {
                state: QueryState::Failed,
                reason: Some(reason.to_string()),
            }),
            ..Self::succeeded()
        }
    }

    /// Never finishes unless stopped.
    pub fn hangs() -> Self {
        Self {
            outcome: None,
            ..Self::succeeded()
        }
    }

    pub fn after_polls(mut self, n: usize) -> Self {
        self.running_polls = n;
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Result pages; page `k` is served under token `t{k}`.
    pub fn with_pages(mut self, pages: Vec<Vec<Vec<String>>>) -> Self {
        self.pages = if pages.is_empty() { vec![Vec::new()] } else { pages };
        self
    }

    /// The last page hands out token `t{page}` again instead of ending.
    pub fn looping_back_to(mut self, page: usize) -> Self {
        self.loop_to = Some(page);
        self
    }
}

#[derive(Debug)]
struct MemQuery {
    sql: String,
    location: String,
    script: ScriptedQuery,
    polls: usize,
    stopped: bool,
    stop_calls: usize,
}

impl MemQuery {
    fn status(&self) -> QueryStatus {
        if self.stopped {
            return QueryStatus::new(QueryState::Cancelled);
        }
        match &self.script.outcome {
            Some(outcome) if self.polls > self.script.running_polls => outcome.clone(),
            _ => QueryStatus::new(QueryState::Running),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: VecDeque<ScriptedQuery>,
    queries: HashMap<String, MemQuery>,
    throttled_starts: usize,
    results_calls: usize,
    next_id: u64,
}

/// In-memory query engine replaying [`ScriptedQuery`]s in submission order.
/// Queries beyond the queued scripts succeed with no rows.
#[derive(Debug, Default)]
pub struct MemoryQueryService {
    inner: Mutex<Inner>,
}

impl MemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, script: ScriptedQuery) -> Self {
        self.inner.lock().scripts.push_back(script);
        self
    }

    /// The next `n` start calls are throttled.
    pub fn throttle_starts(self, n: usize) -> Self {
        self.inner.lock().throttled_starts = n;
        self
    }

    pub fn sql_of(&self, query_id: &str) -> Option<String> {
        self.inner.lock().queries.get(query_id).map(|q| q.sql.clone())
    }

    pub fn location_of(&self, query_id: &str) -> Option<String> {
        self.inner.lock().queries.get(query_id).map(|q| q.location.clone())
    }

    pub fn stop_calls(&self, query_id: &str) -> usize {
        self.inner
            .lock()
            .queries
            .get(query_id)
            .map(|q| q.stop_calls)
            .unwrap_or(0)
    }

    pub fn results_calls(&self) -> usize {
        self.inner.lock().results_calls
    }
}

fn unknown(query_id: &str) -> QueryError {
    QueryError::Service(format!("query {} not found", query_id))
}

#[async_trait]
impl QueryService for MemoryQueryService {
    async fn start_query(
        &self,
        sql: &str,
        result_location: &str,
        _workgroup: &str,
    ) -> Result<String, QueryError> {
        let mut inner = self.inner.lock();
        if inner.throttled_starts > 0 {
            inner.throttled_starts -= 1;
            return Err(QueryError::Throttling {
                retry_after_secs: None,
            });
        }
        inner.next_id += 1;
        let query_id = format!("q-{}", inner.next_id);
        let script = inner.scripts.pop_front().unwrap_or_else(ScriptedQuery::succeeded);
        inner.queries.insert(
            query_id.clone(),
            MemQuery {
                sql: sql.to_string(),
                location: result_location.to_string(),
                script,
                polls: 0,
                stopped: false,
                stop_calls: 0,
            },
        );
        Ok(query_id)
    }

    async fn get_status(&self, query_id: &str) -> Result<QueryStatus, QueryError> {
        let mut inner = self.inner.lock();
        let query = inner.queries.get_mut(query_id).ok_or_else(|| unknown(query_id))?;
        query.polls += 1;
        Ok(query.status())
    }

    async fn get_results(
        &self,
        query_id: &str,
        token: Option<&str>,
    ) -> Result<ResultPage, QueryError> {
        let mut inner = self.inner.lock();
        inner.results_calls += 1;
        let query = inner.queries.get(query_id).ok_or_else(|| unknown(query_id))?;

        let index = match token {
            None => 0,
            Some(t) => t
                .strip_prefix('t')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n < query.script.pages.len())
                .ok_or_else(|| QueryError::Service(format!("invalid token: {}", t)))?,
        };
        let next_token = if index + 1 < query.script.pages.len() {
            Some(format!("t{}", index + 1))
        } else {
            query.script.loop_to.map(|page| format!("t{}", page))
        };
        Ok(ResultPage {
            columns: query.script.columns.clone(),
            rows: query.script.pages[index].clone(),
            next_token,
        })
    }

    async fn stop_query(&self, query_id: &str) -> Result<(), QueryError> {
        let mut inner = self.inner.lock();
        let query = inner.queries.get_mut(query_id).ok_or_else(|| unknown(query_id))?;
        query.stop_calls += 1;
        if !query.status().state.is_terminal() {
            query.stopped = true;
        }
        Ok(())
    }
}
