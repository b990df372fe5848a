//! Data models for the LogScale pipeline.
//!
//! This module contains the log payloads, the stream event, and the
//! per-service aggregate.

pub mod log;
pub mod metrics;

pub use log::{is_storable_timestamp, LogEvent, LogLevel, LogRecord, LogRequest, LogValidationError};
pub use metrics::{DeadLetterEvent, ServiceMetrics};
