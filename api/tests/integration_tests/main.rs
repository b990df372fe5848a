//! Integration tests for the LogScale API.
//!
//! These tests drive the complete router: ingesting and querying logs,
//! reading service metrics, and the publish-to-worker flow.

mod common;
mod health_tests;
mod logs_tests;
mod metrics_tests;
mod pipeline_tests;
