//! Incremental per-service metrics.

use crate::models::{LogEvent, ServiceMetrics};
use crate::storage::{InMemoryMetricsStore, MetricsStore, MetricsStoreError};
use std::sync::Arc;
use thiserror::Error;

/// Failure to fold an event into its service's metrics.
#[derive(Debug, Error)]
#[error("Failed to aggregate event for service '{service}': {source}")]
pub struct AggregationError {
    /// Service the event belonged to.
    pub service: String,
    /// Underlying store failure.
    #[source]
    pub source: MetricsStoreError,
}

/// Folds log events into running per-service totals.
///
/// Each [`apply`](Self::apply) is a single atomic read-modify-write on the
/// service's row. There is no deduplication: applying the same event twice
/// counts it twice.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use shared::models::LogEvent;
/// use shared::pipeline::MetricsAggregator;
///
/// # tokio_test::block_on(async {
/// let aggregator = MetricsAggregator::in_memory();
/// let event = LogEvent::new("1", "auth", "error", "boom", Utc::now());
///
/// let metrics = aggregator.apply(&event).await.unwrap();
/// assert_eq!(metrics.error_count, 1);
/// # });
/// ```
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn MetricsStore>,
}

impl MetricsAggregator {
    /// Creates an aggregator over `store`.
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Creates an aggregator over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryMetricsStore::new_shared())
    }

    /// Applies one event and returns the service's updated metrics.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError`] if the store cannot complete the update.
    /// The row is left as it was.
    pub async fn apply(&self, event: &LogEvent) -> Result<ServiceMetrics, AggregationError> {
        let metrics = self
            .store
            .apply(event)
            .await
            .map_err(|source| AggregationError {
                service: event.service.clone(),
                source,
            })?;

        tracing::debug!(
            service = %metrics.service,
            level = %event.level,
            total_logs = metrics.total_logs,
            error_rate = metrics.error_rate,
            "Updated service metrics"
        );
        Ok(metrics)
    }

    /// Returns the metrics for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsStoreError::NotFound`] if no event for `service` has
    /// been applied.
    pub async fn get(&self, service: &str) -> Result<ServiceMetrics, MetricsStoreError> {
        self.store.get(service).await
    }

    /// Returns the metrics of every service, ordered by service name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list(&self) -> Result<Vec<ServiceMetrics>, MetricsStoreError> {
        self.store.list().await
    }

    /// Checks that the underlying store is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store does not respond.
    pub async fn ping(&self) -> Result<(), MetricsStoreError> {
        self.store.ping().await
    }
}
