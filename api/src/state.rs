//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use shared::models::{LogEvent, LogRecord};
use shared::pipeline::MetricsAggregator;
use shared::storage::{InMemoryLogStore, LogStore};
use shared::stream::PublishQueue;
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// This struct contains all the shared resources needed by the API,
/// such as storage backends and the publish queue.
#[derive(Clone)]
pub struct AppState {
    /// The log storage backend.
    log_store: Arc<dyn LogStore>,
    /// Read side of the service metrics.
    aggregator: MetricsAggregator,
    /// Where stored logs are handed to the stream, if publishing is enabled.
    publish_queue: Option<PublishQueue>,
}

impl AppState {
    /// Creates a new application state with the given stores and publishing
    /// disabled.
    pub fn new(log_store: Arc<dyn LogStore>, aggregator: MetricsAggregator) -> Self {
        Self {
            log_store,
            aggregator,
            publish_queue: None,
        }
    }

    /// Enables publishing through `queue`.
    #[must_use]
    pub fn with_publish_queue(mut self, queue: PublishQueue) -> Self {
        self.publish_queue = Some(queue);
        self
    }

    /// Creates a new application state with in-memory stores.
    ///
    /// This is useful for development and testing.
    #[must_use]
    pub fn with_in_memory_store() -> Self {
        Self::new(
            Arc::new(InMemoryLogStore::new()),
            MetricsAggregator::in_memory(),
        )
    }

    /// Returns a reference to the log store.
    #[must_use]
    pub fn log_store(&self) -> &dyn LogStore {
        self.log_store.as_ref()
    }

    /// Returns the metrics aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// Returns the publish queue, if publishing is enabled.
    #[must_use]
    pub fn publish_queue(&self) -> Option<&PublishQueue> {
        self.publish_queue.as_ref()
    }

    /// Hands stored records to the publish queue without waiting.
    ///
    /// Returns how many were queued. Does nothing when publishing is disabled.
    pub fn publish(&self, records: &[LogRecord]) -> usize {
        let Some(queue) = &self.publish_queue else {
            return 0;
        };
        records
            .iter()
            .filter(|record| queue.enqueue(LogEvent::from(*record)))
            .count()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_in_memory_store()
    }
}
