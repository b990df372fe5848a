//! Integration tests for the service metrics endpoints.

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use shared::models::LogEvent;

use super::common::{get, test_app};

#[tokio::test]
async fn test_metrics_reflect_applied_events() {
    let (app, state) = test_app();
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for (i, level) in ["error", "warn", "info", "debug"].iter().enumerate() {
        state
            .aggregator()
            .apply(&LogEvent::new(i.to_string(), "auth", *level, "m", at))
            .await
            .unwrap();
    }

    let (status, metrics) = get(app, "/v1/metrics/auth").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total_logs"], 4);
    assert_eq!(metrics["error_count"], 1);
    assert_eq!(metrics["warning_count"], 1);
    assert_eq!(metrics["info_count"], 1);
    assert_eq!(metrics["debug_count"], 1);
    assert_eq!(metrics["error_rate"], 0.25);
    assert_eq!(metrics["last_log_time"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_list_is_ordered_by_service() {
    let (app, state) = test_app();
    for service in ["payments", "auth", "gateway"] {
        state
            .aggregator()
            .apply(&LogEvent::new("1", service, "info", "m", Utc::now()))
            .await
            .unwrap();
    }

    let (status, list) = get(app, "/v1/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let services: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["service"].as_str().unwrap())
        .collect();
    assert_eq!(services, vec!["auth", "gateway", "payments"]);
}

#[tokio::test]
async fn test_unknown_service_is_404() {
    let (app, _state) = test_app();

    let (status, response) = get(app, "/v1/metrics/nobody").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "not_found");
}
