//! API route definitions.
//!
//! This module organizes all HTTP routes for the LogScale API server.

mod health;
mod logs;
mod metrics;
mod root;

pub use health::{health_routes, HealthResponse};
pub use logs::{logs_routes, BatchCreatedResponse};
pub use metrics::metrics_routes;
pub use root::root_routes;
