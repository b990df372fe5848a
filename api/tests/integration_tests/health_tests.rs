//! Integration tests for health check and general API functionality.
//!
//! Tests cover:
//! - Health check endpoint
//! - Service description
//! - Empty store behavior

use axum::http::StatusCode;

use super::common::{get, test_app};

#[tokio::test]
async fn test_health_check() {
    let (app, _state) = test_app();

    let (status, response) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert!(response["timestamp"].is_string());
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (app, _state) = test_app();

    let (status, response) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "LogScale API");
    assert_eq!(response["endpoints"]["logs"], "/v1/logs");
    assert_eq!(response["endpoints"]["health"], "/health");
}

#[tokio::test]
async fn test_empty_stores_return_empty_results() {
    let (app, _state) = test_app();

    let (status, response) = get(app.clone(), "/v1/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["pagination"]["total"], 0);
    assert!(response["data"].as_array().unwrap().is_empty());

    let (status, response) = get(app, "/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _state) = test_app();

    let (status, _) = get(app, "/v2/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
