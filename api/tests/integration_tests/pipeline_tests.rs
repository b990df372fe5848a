//! End-to-end tests: HTTP ingestion, publishing, the worker, and the
//! metrics endpoints.

use axum::http::StatusCode;
use serde_json::json;
use shared::pipeline::{Worker, WorkerConfig};
use shared::stream::EventStream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::common::{get, post_json, publishing_app, STREAM};

#[tokio::test]
async fn test_ingested_logs_reach_service_metrics() {
    let app = publishing_app();
    let worker = Worker::new(
        app.stream.clone(),
        app.state.aggregator().clone(),
        WorkerConfig::default()
            .with_stream(STREAM)
            .with_block_timeout(Duration::from_millis(20)),
    );
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    let (status, _) = post_json(
        app.router.clone(),
        "/v1/logs",
        json!({"logs": [
            {"service": "auth", "level": "error", "message": "boom", "timestamp": "2024-01-01T00:00:00Z"},
            {"service": "auth", "level": "info", "message": "ok", "timestamp": "2024-01-01T00:00:01Z"},
            {"service": "auth", "level": "info", "message": "ok", "timestamp": "2024-01-01T00:00:02Z"}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let metrics = loop {
        let (status, metrics) = get(app.router.clone(), "/v1/metrics/auth").await;
        if status == StatusCode::OK && metrics["total_logs"] == 3 {
            break metrics;
        }
        assert!(tokio::time::Instant::now() < deadline, "metrics never caught up");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    cancel.cancel();
    let stats = run.await.unwrap().unwrap();

    assert_eq!(metrics["error_count"], 1);
    assert_eq!(metrics["info_count"], 2);
    let rate = metrics["error_rate"].as_f64().unwrap();
    assert!((rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(metrics["last_log_time"], "2024-01-01T00:00:02Z");
    assert_eq!(stats.processed, 3);
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_ingestion() {
    let app = publishing_app();
    // Nothing empties the queue once the drain task is gone.
    app.drain.abort();

    for i in 0..300 {
        let (status, _) = post_json(
            app.router.clone(),
            "/v1/logs",
            json!({"log": {"service": "api", "level": "info", "message": format!("m{i}")}}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    assert_eq!(app.state.log_store().count().await.unwrap(), 300);
    assert!(app.state.publish_queue().unwrap().dropped() > 0);
    assert!(app.stream.info(STREAM).await.unwrap().length < 300);
}
