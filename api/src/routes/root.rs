//! Service description at `/`.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

/// Creates the root route.
pub fn root_routes() -> Router {
    Router::new().route("/", get(service_info))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "message": "LogScale API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "logs": "/v1/logs",
            "metrics": "/v1/metrics",
        },
    }))
}
