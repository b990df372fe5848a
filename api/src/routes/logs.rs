//! Log ingestion and query endpoints.
//!
//! Stored logs are handed to the publish queue after the write succeeds.
//! Publishing never affects the response.

use crate::error::{error_response, log_store_error, ApiError, ErrorResponse};
use crate::pagination::{Paginated, Pagination};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{is_storable_timestamp, LogRecord, LogRequest};
use shared::storage::LogFilter;

/// Request body for log ingestion: `{"log": {...}}` or `{"logs": [...]}`.
#[derive(Debug, Deserialize)]
pub struct CreateLogsRequest {
    /// A single log.
    #[serde(default)]
    pub log: Option<LogRequest>,
    /// A batch of logs.
    #[serde(default)]
    pub logs: Option<Vec<LogRequest>>,
}

/// Response for a batch ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCreatedResponse {
    /// The stored logs.
    pub logs: Vec<LogRecord>,
    /// Number of logs stored.
    pub count: usize,
}

/// Query parameters for listing logs.
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Exact service name.
    pub service: Option<String>,
    /// Exact level.
    pub level: Option<String>,
    /// Earliest timestamp, RFC 3339.
    pub start_time: Option<String>,
    /// Latest timestamp, RFC 3339.
    pub end_time: Option<String>,
    /// 1-based page.
    pub page: Option<String>,
    /// Page size.
    pub limit: Option<String>,
}

/// Creates the log routes.
pub fn logs_routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/logs", post(create_logs).get(query_logs))
        .with_state(state)
}

fn validate_all(requests: &[LogRequest]) -> Result<(), ErrorResponse> {
    for (index, request) in requests.iter().enumerate() {
        if let Err(err) = request.validate_request() {
            let mut body = ApiError::from(err);
            if requests.len() > 1 {
                body.message = format!("Log {index}: {}", body.message);
            }
            return Err((StatusCode::BAD_REQUEST, Json(body)));
        }
    }
    Ok(())
}

/// Handler for log ingestion.
///
/// Returns 201 with the stored log for `log`, or 201 with all stored logs
/// and their count for `logs`. A batch is stored all or nothing.
async fn create_logs(
    State(state): State<AppState>,
    payload: Result<Json<CreateLogsRequest>, JsonRejection>,
) -> Result<Response, ErrorResponse> {
    let Json(request) = payload.map_err(|rejection| {
        error_response(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
    })?;

    if let Some(log) = request.log {
        validate_all(std::slice::from_ref(&log))?;
        let record = state
            .log_store()
            .insert(log)
            .await
            .map_err(|e| log_store_error(&e))?;
        state.publish(std::slice::from_ref(&record));

        tracing::debug!(id = %record.id, service = %record.service, "Stored log");
        return Ok((StatusCode::CREATED, Json(record)).into_response());
    }

    let logs = request.logs.unwrap_or_default();
    if logs.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "empty_batch",
            "No logs provided",
        ));
    }

    validate_all(&logs)?;
    let records = state
        .log_store()
        .insert_batch(logs)
        .await
        .map_err(|e| log_store_error(&e))?;
    state.publish(&records);

    let count = records.len();
    tracing::debug!(count, "Stored log batch");
    Ok((
        StatusCode::CREATED,
        Json(BatchCreatedResponse {
            logs: records,
            count,
        }),
    )
        .into_response())
}

fn parse_time(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ErrorResponse> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let at = DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                "invalid_query",
                format!("Invalid {field} '{raw}': {e}"),
            )
        })?;
    if !is_storable_timestamp(&at) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            format!("Invalid {field} '{raw}': outside 1677-09-21 to 2262-04-11"),
        ));
    }
    Ok(Some(at))
}

/// Handler for listing logs, newest first.
async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<Paginated<LogRecord>>, ErrorResponse> {
    let mut filter = LogFilter::new();
    if let Some(service) = params.service.filter(|s| !s.is_empty()) {
        filter = filter.with_service(service);
    }
    if let Some(level) = params.level.filter(|l| !l.is_empty()) {
        filter = filter.with_level(level);
    }
    if let Some(start) = parse_time("start_time", params.start_time.as_deref())? {
        filter = filter.with_start_time(start);
    }
    if let Some(end) = parse_time("end_time", params.end_time.as_deref())? {
        filter = filter.with_end_time(end);
    }

    let pagination = Pagination::from_query(params.page.as_deref(), params.limit.as_deref());
    let limit = usize::try_from(pagination.limit).unwrap_or(usize::MAX);
    let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);

    let result = state
        .log_store()
        .query(&filter, limit, offset)
        .await
        .map_err(|e| log_store_error(&e))?;

    Ok(Json(Paginated {
        data: result.logs,
        pagination: pagination.with_total(u64::try_from(result.total_count).unwrap_or(u64::MAX)),
    }))
}
