//! Error responses shared by all routes.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use shared::models::LogValidationError;
use shared::storage::{LogStoreError, MetricsStoreError};

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type.
    pub error: String,
    /// Detailed error message.
    pub message: String,
}

/// What handlers return on failure.
pub type ErrorResponse = (StatusCode, Json<ApiError>);

/// Builds an error response.
pub fn error_response(
    status: StatusCode,
    error: &str,
    message: impl Into<String>,
) -> ErrorResponse {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

impl From<LogValidationError> for ApiError {
    fn from(err: LogValidationError) -> Self {
        Self {
            error: "validation_failed".to_string(),
            message: format!("Missing or invalid fields: {}", err.fields().join(", ")),
        }
    }
}

/// Maps a log store failure to 500.
pub fn log_store_error(err: &LogStoreError) -> ErrorResponse {
    tracing::error!(error = %err, "Log store operation failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", err.to_string())
}

/// Maps a metrics store failure to 404 or 500.
pub fn metrics_store_error(err: &MetricsStoreError) -> ErrorResponse {
    match err {
        MetricsStoreError::NotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "Metrics store operation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let (status, Json(body)) =
            metrics_store_error(&MetricsStoreError::NotFound("auth".to_string()));

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "not_found");
        assert!(body.message.contains("auth"));
    }

    #[test]
    fn test_storage_error_maps_to_500() {
        let (status, Json(body)) = metrics_store_error(&MetricsStoreError::LockError);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "storage_error");
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = shared::models::LogRequest::new("", "", "x")
            .validate_request()
            .unwrap_err();

        let body = ApiError::from(err);

        assert_eq!(body.error, "validation_failed");
        assert_eq!(body.message, "Missing or invalid fields: level, service");
    }
}
