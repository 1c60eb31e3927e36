use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatus {
    pub state: QueryState,
    /// Failure or cancellation reason reported by the engine.
    pub reason: Option<String>,
}

impl QueryStatus {
    pub fn new(state: QueryState) -> Self {
        Self { state, reason: None }
    }
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub next_token: Option<String>,
}

/// Managed SQL query engine.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn start_query(
        &self,
        sql: &str,
        result_location: &str,
        workgroup: &str,
    ) -> Result<String, QueryError>;

    async fn get_status(&self, query_id: &str) -> Result<QueryStatus, QueryError>;

    async fn get_results(
        &self,
        query_id: &str,
        token: Option<&str>,
    ) -> Result<ResultPage, QueryError>;

    async fn stop_query(&self, query_id: &str) -> Result<(), QueryError>;
}
