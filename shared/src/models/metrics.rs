//! Service metrics and dead-letter models.

use super::log::{LogEvent, LogLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals for one service.
///
/// Counters only ever grow, and `error_rate` is always derived from them
/// by [`ServiceMetrics::record`]; it is never set on its own.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use shared::models::{LogEvent, ServiceMetrics};
///
/// let now = Utc::now();
/// let mut metrics = ServiceMetrics::new("auth", now, now);
/// metrics.record(&LogEvent::new("1", "auth", "error", "boom", now), now);
/// metrics.record(&LogEvent::new("2", "auth", "info", "ok", now), now);
///
/// assert_eq!(metrics.total_logs, 2);
/// assert!((metrics.error_rate - 0.5).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceMetrics {
    /// Service name, unique across rows.
    pub service: String,
    /// Number of events seen.
    pub total_logs: i64,
    /// Events with level `error`.
    pub error_count: i64,
    /// Events with level `warn`.
    pub warning_count: i64,
    /// Events with level `info`.
    pub info_count: i64,
    /// Events with level `debug`.
    pub debug_count: i64,
    /// `error_count / total_logs`, or 0 when no events were seen.
    pub error_rate: f64,
    /// Timestamp of the most recently applied event.
    pub last_log_time: DateTime<Utc>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last changed.
    pub updated_at: DateTime<Utc>,
}

impl ServiceMetrics {
    /// Creates a zeroed row for a service first seen at `last_log_time`.
    #[must_use]
    pub fn new(service: impl Into<String>, last_log_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            service: service.into(),
            total_logs: 0,
            error_count: 0,
            warning_count: 0,
            info_count: 0,
            debug_count: 0,
            error_rate: 0.0,
            last_log_time,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies one event to the totals.
    ///
    /// Unknown levels bump `total_logs` only.
    pub fn record(&mut self, event: &LogEvent, now: DateTime<Utc>) {
        self.total_logs += 1;
        self.last_log_time = event.timestamp;
        self.updated_at = now;

        match event.known_level() {
            Some(LogLevel::Error) => self.error_count += 1,
            Some(LogLevel::Warn) => self.warning_count += 1,
            Some(LogLevel::Info) => self.info_count += 1,
            Some(LogLevel::Debug) => self.debug_count += 1,
            None => {}
        }

        self.error_rate = self.compute_error_rate();
    }

    /// Derives the error rate from the current counters.
    #[must_use]
    pub fn compute_error_rate(&self) -> f64 {
        if self.total_logs <= 0 {
            return 0.0;
        }
        // Counts stay far below 2^52, so the conversion is exact in practice.
        #[allow(clippy::cast_precision_loss)]
        let rate = self.error_count as f64 / self.total_logs as f64;
        rate
    }
}

/// An entry that could not be processed, as written to the dead-letter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    /// Identifier of this dead-letter record.
    pub id: String,
    /// Stream entry id of the failed entry.
    pub original_id: String,
    /// The failed entry's raw fields, JSON-encoded.
    pub event: String,
    /// Why processing failed.
    pub error: String,
    /// How many times processing was retried before giving up.
    pub retry_count: u32,
    /// When the entry was given up on.
    pub failed_at: DateTime<Utc>,
    /// Stream the entry was read from.
    pub stream_name: String,
}
