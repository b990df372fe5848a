//! Storage traits and implementations.
//!
//! The `LogStore` trait holds raw log rows and the `MetricsStore` trait holds
//! one running-totals row per service. Each has an in-memory implementation
//! and a database-backed one.

pub mod log_store;
pub mod metrics_store;

pub use log_store::{
    ClickHouseLogStore, InMemoryLogStore, LogFilter, LogQueryResult, LogStore, LogStoreError,
};
pub use metrics_store::{
    InMemoryMetricsStore, MetricsStore, MetricsStoreError, PostgresMetricsStore,
};
