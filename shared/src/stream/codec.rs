//! Conversion between [`LogEvent`] and flat stream field sets.
//!
//! Field names are part of the wire format shared with other producers and
//! consumers of the stream and must not change.

use crate::models::{DeadLetterEvent, LogEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Stream entry field names.
pub mod fields {
    /// Storage identifier of the log.
    pub const ID: &str = "id";
    /// Service name.
    pub const SERVICE: &str = "service";
    /// Severity level.
    pub const LEVEL: &str = "level";
    /// Log message.
    pub const MESSAGE: &str = "message";
    /// Event time, RFC 3339.
    pub const TIMESTAMP: &str = "timestamp";
    /// JSON-encoded metadata.
    pub const META: &str = "meta";
    /// Creation time, RFC 3339.
    pub const CREATED_AT: &str = "created_at";
}

const DEFAULT_META: &str = "{}";

/// Errors raised when a stream entry cannot be turned into a [`LogEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A timestamp field is not valid RFC 3339.
    #[error("invalid {field} '{value}': {source}")]
    InvalidTimestamp {
        /// Field name.
        field: &'static str,
        /// Raw field value.
        value: String,
        /// Parse failure.
        #[source]
        source: chrono::ParseError,
    },
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&Utc))
}

/// Encodes an event as a stream field set.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use shared::models::LogEvent;
/// use shared::stream::encode_event;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let fields = encode_event(&LogEvent::new("7", "auth", "error", "boom", at));
///
/// assert!(fields.contains(&("timestamp".to_string(), "2024-01-01T00:00:00Z".to_string())));
/// ```
#[must_use]
pub fn encode_event(event: &LogEvent) -> Vec<(String, String)> {
    vec![
        (fields::ID.to_string(), event.id.clone()),
        (fields::SERVICE.to_string(), event.service.clone()),
        (fields::LEVEL.to_string(), event.level.clone()),
        (fields::MESSAGE.to_string(), event.message.clone()),
        (fields::TIMESTAMP.to_string(), format_time(&event.timestamp)),
        (fields::META.to_string(), event.meta.clone()),
        (fields::CREATED_AT.to_string(), format_time(&event.created_at)),
    ]
}

fn required<'a>(
    values: &'a HashMap<String, String>,
    field: &'static str,
) -> Result<&'a str, DecodeError> {
    values
        .get(field)
        .map(String::as_str)
        .ok_or(DecodeError::MissingField(field))
}

/// Decodes a stream field set into an event.
///
/// `meta` falls back to `{}` when absent or empty. `created_at` falls back
/// to `timestamp` when absent or unparsable.
///
/// # Errors
///
/// Returns an error if `id`, `service`, `level`, `message` or `timestamp`
/// is missing, or if `timestamp` is not valid RFC 3339.
pub fn decode_event(values: &HashMap<String, String>) -> Result<LogEvent, DecodeError> {
    let id = required(values, fields::ID)?;
    let service = required(values, fields::SERVICE)?;
    let level = required(values, fields::LEVEL)?;
    let message = required(values, fields::MESSAGE)?;
    let raw_timestamp = required(values, fields::TIMESTAMP)?;

    let timestamp = parse_time(raw_timestamp).map_err(|source| DecodeError::InvalidTimestamp {
        field: fields::TIMESTAMP,
        value: raw_timestamp.to_string(),
        source,
    })?;

    let meta = values
        .get(fields::META)
        .filter(|m| !m.is_empty())
        .map_or_else(|| DEFAULT_META.to_string(), Clone::clone);

    let created_at = values
        .get(fields::CREATED_AT)
        .and_then(|raw| parse_time(raw).ok())
        .unwrap_or(timestamp);

    Ok(LogEvent {
        id: id.to_string(),
        service: service.to_string(),
        level: level.to_string(),
        message: message.to_string(),
        timestamp,
        meta,
        created_at,
    })
}

/// Encodes a dead-letter record as a stream field set.
#[must_use]
pub fn encode_dead_letter(dead: &DeadLetterEvent) -> Vec<(String, String)> {
    vec![
        ("id".to_string(), dead.id.clone()),
        ("original_id".to_string(), dead.original_id.clone()),
        ("event".to_string(), dead.event.clone()),
        ("error".to_string(), dead.error.clone()),
        ("retry_count".to_string(), dead.retry_count.to_string()),
        ("failed_at".to_string(), format_time(&dead.failed_at)),
        ("stream_name".to_string(), dead.stream_name.clone()),
    ]
}
