//! Log data model.
//!
//! Defines the inbound `LogRequest`, the stored `LogRecord`, and the
//! `LogEvent` that flows through the event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Log severity levels that carry their own counter in service metrics.
///
/// Producers may send any level string; levels outside this set are still
/// stored and counted in totals, they just have no dedicated counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational messages.
    Info,
    /// Warning conditions.
    Warn,
    /// Error conditions.
    Error,
}

impl LogLevel {
    /// Resolves a level string to a known level.
    ///
    /// Matching is exact: `"warn"` is recognised, `"warning"` and `"ERROR"` are not.
    ///
    /// ```
    /// use shared::models::LogLevel;
    ///
    /// assert_eq!(LogLevel::from_name("error"), Some(LogLevel::Error));
    /// assert_eq!(LogLevel::from_name("fatal"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns the wire name of the level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `at` fits in nanoseconds since the epoch, the resolution logs
/// are stored at.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use shared::models::is_storable_timestamp;
///
/// assert!(is_storable_timestamp(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
/// assert!(!is_storable_timestamp(&Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap()));
/// ```
#[must_use]
pub fn is_storable_timestamp(at: &DateTime<Utc>) -> bool {
    at.timestamp_nanos_opt().is_some()
}

fn empty_meta() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Payload accepted by the ingestion path for a single log.
///
/// # Example
///
/// ```
/// use shared::models::LogRequest;
///
/// let request = LogRequest::new("auth", "error", "token expired");
/// assert!(request.validate_request().is_ok());
/// assert!(request.timestamp.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogRequest {
    /// Name of the service that produced the log.
    #[serde(default)]
    #[validate(length(min = 1, message = "service is required"))]
    pub service: String,

    /// Severity level.
    #[serde(default)]
    #[validate(length(min = 1, message = "level is required"))]
    pub level: String,

    /// The log message.
    #[serde(default)]
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,

    /// When the event occurred. Defaults to the time of insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Opaque structured metadata.
    #[serde(default = "empty_meta")]
    pub meta: serde_json::Value,
}

/// Errors raised when an inbound log payload is malformed.
#[derive(Debug, Error)]
pub enum LogValidationError {
    /// One or more required fields are absent or empty.
    #[error("Validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl LogValidationError {
    /// Names of the fields that failed validation, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::Invalid(errors) => {
                let mut fields: Vec<String> = errors
                    .field_errors()
                    .keys()
                    .map(ToString::to_string)
                    .collect();
                fields.sort();
                fields
            }
        }
    }
}

impl LogRequest {
    /// Creates a request with no explicit timestamp and empty metadata.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            level: level.into(),
            message: message.into(),
            timestamp: None,
            meta: empty_meta(),
        }
    }

    /// Sets the event timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the metadata payload.
    #[must_use]
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    /// Checks that all required fields are present and that an explicit
    /// timestamp can be stored.
    ///
    /// # Errors
    ///
    /// Returns an error naming the missing or invalid fields.
    pub fn validate_request(&self) -> Result<(), LogValidationError> {
        let mut errors = self.validate().err().unwrap_or_default();
        if self.timestamp.is_some_and(|at| !is_storable_timestamp(&at)) {
            errors.add(
                "timestamp",
                ValidationError::new("out_of_range")
                    .with_message("timestamp must fall between 1677-09-21 and 2262-04-11".into()),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    /// Turns the request into a stored record, assigning an identifier and
    /// defaulting the timestamp to `now`.
    #[must_use]
    pub fn into_record(self, now: DateTime<Utc>) -> LogRecord {
        LogRecord {
            id: Uuid::new_v4().to_string(),
            service: self.service,
            level: self.level,
            message: self.message,
            timestamp: self.timestamp.unwrap_or(now),
            meta: self.meta,
            created_at: now,
        }
    }
}

/// A persisted log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Storage-assigned identifier.
    pub id: String,
    /// Service name.
    pub service: String,
    /// Severity level as sent by the producer.
    pub level: String,
    /// Log message.
    pub message: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Opaque structured metadata.
    pub meta: serde_json::Value,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// The unit flowing through the event stream.
///
/// `meta` holds the metadata as JSON text and is never re-parsed by the
/// pipeline, so whatever the producer stored is passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Echo of the storage identifier.
    pub id: String,
    /// Service name.
    pub service: String,
    /// Severity level.
    pub level: String,
    /// Log message.
    pub message: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// JSON-encoded metadata.
    pub meta: String,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl LogEvent {
    /// Builds an event with empty metadata and `created_at == timestamp`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            level: level.into(),
            message: message.into(),
            timestamp,
            meta: "{}".to_string(),
            created_at: timestamp,
        }
    }

    /// Returns the known level of this event, if any.
    #[must_use]
    pub fn known_level(&self) -> Option<LogLevel> {
        LogLevel::from_name(&self.level)
    }
}

impl From<&LogRecord> for LogEvent {
    fn from(record: &LogRecord) -> Self {
        Self {
            id: record.id.clone(),
            service: record.service.clone(),
            level: record.level.clone(),
            message: record.message.clone(),
            timestamp: record.timestamp,
            meta: record.meta.to_string(),
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_level_from_name_known() {
        assert_eq!(LogLevel::from_name("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_name("warn"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_name("error"), Some(LogLevel::Error));
    }

    #[test]
    fn test_level_from_name_is_exact() {
        assert_eq!(LogLevel::from_name("warning"), None);
        assert_eq!(LogLevel::from_name("ERROR"), None);
        assert_eq!(LogLevel::from_name(""), None);
    }

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_request_validation_passes() {
        let request = LogRequest::new("api", "info", "started");
        assert!(request.validate_request().is_ok());
    }

    #[test]
    fn test_request_validation_reports_missing_fields() {
        let request = LogRequest::new("", "info", "");
        let err = request.validate_request().unwrap_err();
        assert_eq!(err.fields(), vec!["message", "service"]);
    }

    #[test]
    fn test_request_without_required_keys_fails_validation() {
        let request: LogRequest = serde_json::from_value(json!({"service": "api"})).unwrap();

        let err = request.validate_request().unwrap_err();

        assert_eq!(err.fields(), vec!["level", "message"]);
    }

    #[test]
    fn test_request_validation_rejects_unstorable_timestamp() {
        let request = LogRequest::new("api", "info", "late")
            .with_timestamp(Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap());

        let err = request.validate_request().unwrap_err();

        assert_eq!(err.fields(), vec!["timestamp"]);
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let request: LogRequest =
            serde_json::from_value(json!({"service": "api", "level": "info", "message": "hi"}))
                .unwrap();

        assert!(request.timestamp.is_none());
        assert_eq!(request.meta, json!({}));
    }

    #[test]
    fn test_into_record_defaults_timestamp_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = LogRequest::new("api", "info", "hi").into_record(now);

        assert_eq!(record.timestamp, now);
        assert_eq!(record.created_at, now);
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_into_record_keeps_explicit_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = LogRequest::new("api", "info", "hi")
            .with_timestamp(earlier)
            .into_record(now);

        assert_eq!(record.timestamp, earlier);
        assert_eq!(record.created_at, now);
    }

    #[test]
    fn test_event_from_record() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = LogRequest::new("auth", "error", "boom")
            .with_meta(json!({"user": 42}))
            .into_record(now);

        let event = LogEvent::from(&record);

        assert_eq!(event.id, record.id);
        assert_eq!(event.service, "auth");
        assert_eq!(event.known_level(), Some(LogLevel::Error));
        assert_eq!(event.meta, r#"{"user":42}"#);
        assert_eq!(event.created_at, now);
    }
}
