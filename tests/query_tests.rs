use std::sync::Arc;

use batchflow::query::{
    FetchPage, MemoryQueryService, QueryAdapterConfig, QueryError, QueryExecutionAdapter,
    QueryState, ScriptedQuery, StagingLocation,
};
use batchflow::{CancelSignal, ErrorCode};

fn rows(prefix: &str, n: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|i| vec![format!("{}-{}", prefix, i), i.to_string()])
        .collect()
}

fn staging() -> StagingLocation {
    StagingLocation::parse("s3://nyc-taxi-bucket/athena-results").unwrap()
}

fn adapter(service: &Arc<MemoryQueryService>) -> QueryExecutionAdapter {
    QueryExecutionAdapter::new(
        service.clone(),
        QueryAdapterConfig {
            poll_interval_ms: 1_000,
            timeout_secs: 30,
            ..QueryAdapterConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_pagination_accumulates_every_page_once() {
    let service = Arc::new(MemoryQueryService::new().then(
        ScriptedQuery::succeeded()
            .after_polls(2)
            .with_columns(&["zone", "trips"])
            .with_pages(vec![rows("p1", 10), rows("p2", 10), rows("p3", 5)]),
    ));
    let adapter = adapter(&service);
    let cancel = CancelSignal::new();

    let id = adapter
        .submit("SELECT zone, COUNT(*) FROM trips GROUP BY zone", &staging())
        .await
        .unwrap();
    adapter.wait(&id, &cancel).await.unwrap();

    let mut all = Vec::new();
    let mut cursors = Vec::new();
    let mut cursor = String::new();
    loop {
        let page = adapter.fetch(&id, &cursor).await.unwrap();
        all.extend(page.rows);
        cursors.push(page.next_cursor.clone());
        if page.next_cursor.is_empty() {
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(all.len(), 25);
    assert_eq!(cursors, vec!["t1", "t2", ""]);
    let mut unique = all.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 25);

    // Exhausted: nothing more, and the service is not asked again.
    let calls_before = service.results_calls();
    let page = adapter.fetch(&id, "").await.unwrap();
    assert_eq!(page, FetchPage::default());
    assert_eq!(service.results_calls(), calls_before);
    assert!(adapter.run_info(&id).unwrap().is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn test_run_collects_result() {
    let service = Arc::new(MemoryQueryService::new().then(
        ScriptedQuery::succeeded()
            .with_columns(&["zone", "trips"])
            .with_pages(vec![rows("a", 3), rows("b", 2)]),
    ));
    let adapter = adapter(&service);

    let result = adapter
        .run("SELECT * FROM trips", &staging(), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["zone", "trips"]);
    assert_eq!(result.len(), 5);
    let text = result.render_text(2);
    assert!(text.starts_with("zone\ttrips"));
    assert!(text.contains("showing 2 of 5 rows"));
}

#[tokio::test(start_paused = true)]
async fn test_run_enforces_row_limit() {
    let service = Arc::new(
        MemoryQueryService::new()
            .then(ScriptedQuery::succeeded().with_pages(vec![rows("a", 4), rows("b", 4)])),
    );
    let adapter = QueryExecutionAdapter::new(
        service.clone(),
        QueryAdapterConfig {
            max_result_rows: 5,
            ..QueryAdapterConfig::default()
        },
    );

    let err = adapter
        .run("SELECT * FROM trips", &staging(), &CancelSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::ResultTooLarge(_)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_cursor_rejected() {
    let service = Arc::new(
        MemoryQueryService::new()
            .then(ScriptedQuery::succeeded().with_pages(vec![rows("a", 2), rows("b", 2), rows("c", 1)])),
    );
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();
    adapter.wait(&id, &CancelSignal::new()).await.unwrap();

    let first = adapter.fetch(&id, "").await.unwrap();
    assert_eq!(first.next_cursor, "t1");

    // Re-reading the first page would duplicate rows.
    let err = adapter.fetch(&id, "").await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::StaleCursor { ref expected, ref got, .. } if expected == "t1" && got.is_empty()
    ));

    let second = adapter.fetch(&id, "t1").await.unwrap();
    assert_eq!(second.rows, rows("b", 2));
}

#[tokio::test]
async fn test_fetch_before_success_not_ready() {
    let service = Arc::new(MemoryQueryService::new().then(ScriptedQuery::hangs()));
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();

    assert_eq!(adapter.poll(&id).await.unwrap(), QueryState::Running);
    assert!(matches!(
        adapter.fetch(&id, "").await,
        Err(QueryError::NotReady {
            state: QueryState::Running,
            ..
        })
    ));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let service = Arc::new(MemoryQueryService::new().then(ScriptedQuery::hangs()));
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();

    adapter.cancel(&id).await.unwrap();
    adapter.cancel(&id).await.unwrap();

    assert_eq!(service.stop_calls(&id), 1);
    assert_eq!(adapter.poll(&id).await.unwrap(), QueryState::Cancelled);
}

#[tokio::test]
async fn test_cancel_after_success_is_noop() {
    let service = Arc::new(MemoryQueryService::new());
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();
    assert_eq!(adapter.poll(&id).await.unwrap(), QueryState::Succeeded);

    adapter.cancel(&id).await.unwrap();
    assert_eq!(service.stop_calls(&id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_query() {
    let service = Arc::new(MemoryQueryService::new().then(ScriptedQuery::hangs()));
    let adapter = QueryExecutionAdapter::new(
        service.clone(),
        QueryAdapterConfig {
            poll_interval_ms: 1_000,
            timeout_secs: 5,
            ..QueryAdapterConfig::default()
        },
    );
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();

    let err = adapter.wait(&id, &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, QueryError::Timeout { timeout_secs: 5, .. }));
    assert_eq!(err.error_code(), ErrorCode::Timeout);
    assert_eq!(service.stop_calls(&id), 1);
    assert_eq!(adapter.run_info(&id).unwrap().state, QueryState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_failure_taxonomy() {
    let service = Arc::new(
        MemoryQueryService::new()
            .then(ScriptedQuery::failed(
                "SYNTAX_ERROR: line 1:8: Column 'fare' cannot be resolved",
            ))
            .then(ScriptedQuery::failed("Query exhausted resources at this scale factor"))
            .then(ScriptedQuery::failed("HIVE_CURSOR_ERROR: bad parquet footer")),
    );
    let adapter = adapter(&service);
    let cancel = CancelSignal::new();

    let syntax = adapter.run("SELECT fare FROM trips", &staging(), &cancel).await.unwrap_err();
    assert_eq!(syntax.error_code(), ErrorCode::SyntaxError);
    assert_eq!(
        syntax.to_string(),
        "SYNTAX_ERROR: line 1:8: Column 'fare' cannot be resolved"
    );

    let too_large = adapter.run("SELECT * FROM trips", &staging(), &cancel).await.unwrap_err();
    assert_eq!(too_large.error_code(), ErrorCode::ResultTooLarge);

    let failed = adapter.run("SELECT * FROM trips", &staging(), &cancel).await.unwrap_err();
    assert_eq!(failed.error_code(), ErrorCode::ExecutionFailure);
    assert!(!failed.is_retryable());
}

#[tokio::test]
async fn test_throttled_submit_is_retryable() {
    let service = Arc::new(MemoryQueryService::new().throttle_starts(1));
    let adapter = adapter(&service);

    let err = adapter.submit("SELECT 1", &staging()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), ErrorCode::Throttling);

    assert!(adapter.submit("SELECT 1", &staging()).await.is_ok());
}

#[tokio::test]
async fn test_dialect_rewritten_before_submit() {
    let service = Arc::new(MemoryQueryService::new());
    let adapter = adapter(&service);

    let id = adapter
        .submit(
            "  SELECT * FROM zones WHERE borough ILIKE '%queens%'  ",
            &staging(),
        )
        .await
        .unwrap();

    assert_eq!(
        service.sql_of(&id).as_deref(),
        Some("SELECT * FROM zones WHERE LOWER(borough) LIKE LOWER('%queens%')")
    );
    assert_eq!(
        service.location_of(&id).as_deref(),
        Some("s3://nyc-taxi-bucket/athena-results/")
    );
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancel_during_wait() {
    let service = Arc::new(MemoryQueryService::new().then(ScriptedQuery::hangs()));
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        trigger.trigger("user closed the session");
    });

    let err = adapter.wait(&id, &cancel).await.unwrap_err();
    assert!(matches!(err, QueryError::Cancelled(ref r) if r == "user closed the session"));
    assert_eq!(service.stop_calls(&id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_page_token_rejected() {
    let service = Arc::new(MemoryQueryService::new().then(
        ScriptedQuery::succeeded()
            .with_pages(vec![rows("a", 2), rows("b", 2), Vec::new()])
            .looping_back_to(1),
    ));
    let adapter = adapter(&service);
    let id = adapter.submit("SELECT 1", &staging()).await.unwrap();
    adapter.wait(&id, &CancelSignal::new()).await.unwrap();

    assert_eq!(adapter.fetch(&id, "").await.unwrap().next_cursor, "t1");
    assert_eq!(adapter.fetch(&id, "t1").await.unwrap().next_cursor, "t2");
    let err = adapter.fetch(&id, "t2").await.unwrap_err();
    assert!(matches!(err, QueryError::RepeatedCursor { ref token, .. } if token == "t1"));
    assert_eq!(err.error_code(), ErrorCode::InternalError);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_looping_empty_pages() {
    let service = Arc::new(MemoryQueryService::new().then(
        ScriptedQuery::succeeded()
            .with_pages(vec![rows("a", 1), Vec::new()])
            .looping_back_to(1),
    ));
    let adapter = adapter(&service);

    let err = adapter
        .run("SELECT * FROM trips", &staging(), &CancelSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::RepeatedCursor { .. }));
    assert_eq!(service.results_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_forgets_finished_queries() {
    let service = Arc::new(
        MemoryQueryService::new()
            .then(ScriptedQuery::succeeded().with_pages(vec![rows("a", 2)]))
            .then(ScriptedQuery::failed("HIVE_BAD_DATA: malformed parquet")),
    );
    let adapter = adapter(&service);
    let cancel = CancelSignal::new();

    let result = adapter.run("SELECT 1", &staging(), &cancel).await.unwrap();
    assert_eq!(result.len(), 2);
    assert!(adapter.run_info(&result.query_id).is_none());

    assert!(adapter.run("SELECT 2", &staging(), &cancel).await.is_err());
    assert!(adapter.run_info("q-2").is_none());

    // A forgotten query is unknown to the adapter.
    assert!(matches!(
        adapter.fetch(&result.query_id, "").await,
        Err(QueryError::UnknownQuery(_))
    ));
}
