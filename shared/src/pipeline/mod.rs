//! The asynchronous metrics pipeline.
//!
//! Log events published to the stream are consumed by a [`Worker`] and
//! folded into per-service totals by the [`MetricsAggregator`].

pub mod aggregator;
pub mod worker;

pub use aggregator::{AggregationError, MetricsAggregator};
pub use worker::{
    ProcessError, Worker, WorkerConfig, WorkerStats, DEFAULT_CONSUMER, DEFAULT_GROUP,
};
