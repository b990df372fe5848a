//! Integration tests for log ingestion and querying.
//!
//! Tests cover:
//! - Single and batch ingestion
//! - Validation failures
//! - Filtering by service, level and time range
//! - Pagination

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::common::{get, post_json, test_app};

fn log(service: &str, level: &str, message: &str, timestamp: &str) -> Value {
    json!({
        "service": service,
        "level": level,
        "message": message,
        "timestamp": timestamp,
    })
}

#[tokio::test]
async fn test_ingest_and_query_single_log() {
    let (app, _state) = test_app();

    let (status, created) = post_json(
        app.clone(),
        "/v1/logs",
        json!({"log": {
            "service": "auth",
            "level": "error",
            "message": "token expired",
            "meta": {"user_id": 42}
        }}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, response) = get(app, "/v1/logs").await;
    assert_eq!(status, StatusCode::OK);
    let data = response["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], created["id"]);
    assert_eq!(data[0]["meta"]["user_id"], 42);
}

#[tokio::test]
async fn test_batch_is_all_or_nothing() {
    let (app, state) = test_app();

    let (status, response) = post_json(
        app,
        "/v1/logs",
        json!({"logs": [
            {"service": "auth", "level": "info", "message": "ok"},
            {"service": "auth", "level": "info", "message": ""}
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "validation_failed");
    assert!(response["message"].as_str().unwrap().contains("Log 1"));
    assert_eq!(state.log_store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_required_field_is_reported_as_validation_failure() {
    let (app, state) = test_app();

    let (status, response) = post_json(
        app,
        "/v1/logs",
        json!({"log": {"service": "auth", "message": "no level"}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "validation_failed");
    assert_eq!(response["message"], "Missing or invalid fields: level");
    assert_eq!(state.log_store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_body_object_is_rejected() {
    let (app, _state) = test_app();

    let (status, response) = post_json(app, "/v1/logs", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "empty_batch");
}

#[tokio::test]
async fn test_filter_by_service_and_level() {
    let (app, _state) = test_app();
    post_json(
        app.clone(),
        "/v1/logs",
        json!({"logs": [
            log("auth", "error", "a", "2024-01-01T00:00:00Z"),
            log("auth", "info", "b", "2024-01-01T00:01:00Z"),
            log("billing", "error", "c", "2024-01-01T00:02:00Z"),
        ]}),
    )
    .await;

    let (status, response) = get(app, "/v1/logs?service=auth&level=error").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["pagination"]["total"], 1);
    assert_eq!(response["data"][0]["message"], "a");
}

#[tokio::test]
async fn test_filter_by_inclusive_time_range() {
    let (app, _state) = test_app();
    post_json(
        app.clone(),
        "/v1/logs",
        json!({"logs": [
            log("api", "info", "too early", "2024-01-01T09:59:59Z"),
            log("api", "info", "start", "2024-01-01T10:00:00Z"),
            log("api", "info", "middle", "2024-01-01T10:30:00Z"),
            log("api", "info", "end", "2024-01-01T11:00:00Z"),
            log("api", "info", "too late", "2024-01-01T11:00:01Z"),
        ]}),
    )
    .await;

    let uri = format!(
        "/v1/logs?start_time={}&end_time={}",
        urlencoding::encode("2024-01-01T10:00:00+00:00"),
        urlencoding::encode("2024-01-01T11:00:00+00:00"),
    );
    let (status, response) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    let messages: Vec<&str> = response["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["end", "middle", "start"]);
}

#[tokio::test]
async fn test_pagination() {
    let (app, _state) = test_app();
    let logs: Vec<Value> = (0..25)
        .map(|i| {
            log(
                "api",
                "info",
                &format!("Log {i}"),
                &format!("2024-01-01T00:{i:02}:00Z"),
            )
        })
        .collect();
    post_json(app.clone(), "/v1/logs", json!({"logs": logs})).await;

    let (status, response) = get(app.clone(), "/v1/logs?page=3&limit=10").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["pagination"]["page"], 3);
    assert_eq!(response["pagination"]["limit"], 10);
    assert_eq!(response["pagination"]["total"], 25);
    assert_eq!(response["pagination"]["total_pages"], 3);
    let data = response["data"].as_array().unwrap();
    assert_eq!(data.len(), 5);
    assert_eq!(data[0]["message"], "Log 4");

    let (_, response) = get(app, "/v1/logs?page=0&limit=5000").await;
    assert_eq!(response["pagination"]["page"], 1);
    assert_eq!(response["pagination"]["limit"], 1000);
}
