//! Service metrics endpoints.

use crate::error::{metrics_store_error, ErrorResponse};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use shared::models::ServiceMetrics;

/// Creates the metrics routes.
pub fn metrics_routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/metrics", get(list_metrics))
        .route("/v1/metrics/{service}", get(get_metrics))
        .with_state(state)
}

async fn list_metrics(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceMetrics>>, ErrorResponse> {
    state
        .aggregator()
        .list()
        .await
        .map(Json)
        .map_err(|e| metrics_store_error(&e))
}

async fn get_metrics(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceMetrics>, ErrorResponse> {
    state
        .aggregator()
        .get(&service)
        .await
        .map(Json)
        .map_err(|e| metrics_store_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use shared::models::LogEvent;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_metrics_for_service() {
        let state = AppState::with_in_memory_store();
        state
            .aggregator()
            .apply(&LogEvent::new("1", "auth", "error", "boom", Utc::now()))
            .await
            .unwrap();

        let (status, body) = get_json(metrics_routes(state), "/v1/metrics/auth").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "auth");
        assert_eq!(body["total_logs"], 1);
        assert_eq!(body["error_rate"], 1.0);
    }

    #[tokio::test]
    async fn test_get_metrics_unknown_service() {
        let (status, body) =
            get_json(metrics_routes(AppState::with_in_memory_store()), "/v1/metrics/ghost").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_list_metrics_empty() {
        let (status, body) =
            get_json(metrics_routes(AppState::with_in_memory_store()), "/v1/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }
}
