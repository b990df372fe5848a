//! LogScale Shared Library
//!
//! This crate contains the models, event stream, storage, and metrics
//! pipeline shared by the LogScale API server and worker.
//!
//! # Modules
//!
//! - [`models`] - Log payloads, stream events, and service metrics
//! - [`stream`] - Durable event stream with consumer groups, and the publisher
//! - [`storage`] - Log and metrics storage traits and implementations
//! - [`pipeline`] - Metrics aggregator and the worker loop
//! - [`config`] - Pipeline settings
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use shared::models::LogRequest;
//! use shared::models::LogEvent;
//!
//! let record = LogRequest::new("auth", "error", "token expired").into_record(Utc::now());
//! let event = LogEvent::from(&record);
//!
//! assert_eq!(event.id, record.id);
//! assert_eq!(event.meta, "{}");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod stream;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
