//! Publishing log events to the stream.
//!
//! [`StreamPublisher`] appends one event. [`PublishQueue`] sits in front of
//! it on the ingestion path: handlers enqueue without waiting, and one
//! background task drains the bounded queue in order.

use super::{encode_event, EventStream, StreamError};
use crate::models::LogEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Appends encoded log events to a named stream.
#[derive(Clone)]
pub struct StreamPublisher {
    stream: Arc<dyn EventStream>,
    stream_name: String,
}

impl StreamPublisher {
    /// Creates a publisher for `stream_name`.
    pub fn new(stream: Arc<dyn EventStream>, stream_name: impl Into<String>) -> Self {
        Self {
            stream,
            stream_name: stream_name.into(),
        }
    }

    /// Name of the target stream.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Appends `event` and returns the transport-assigned entry id.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the append fails.
    pub async fn publish(&self, event: &LogEvent) -> Result<String, StreamError> {
        let entry_id = self
            .stream
            .append(&self.stream_name, &encode_event(event))
            .await?;
        tracing::debug!(
            stream = %self.stream_name,
            entry_id = %entry_id,
            service = %event.service,
            "Published log event"
        );
        Ok(entry_id)
    }
}

/// Handle to the bounded publish queue.
///
/// Cloning is cheap. The drain task stops once every handle is dropped and
/// the backlog has been published.
#[derive(Clone)]
pub struct PublishQueue {
    tx: mpsc::Sender<LogEvent>,
    dropped: Arc<AtomicU64>,
}

impl PublishQueue {
    /// Starts the drain task and returns the queue handle with the task's
    /// join handle.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn spawn(publisher: StreamPublisher, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(drain(publisher, rx));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Queues `event` for publishing without waiting.
    ///
    /// Returns `false` and drops the event if the queue is full or closed.
    pub fn enqueue(&self, event: LogEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, service = %event.service, "Publish queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, service = %event.service, "Publish queue closed, dropping event");
                false
            }
        }
    }

    /// Number of events dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn drain(publisher: StreamPublisher, mut rx: mpsc::Receiver<LogEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = publisher.publish(&event).await {
            tracing::warn!(
                stream = %publisher.stream_name(),
                id = %event.id,
                error = %e,
                "Failed to publish log event"
            );
        }
    }
    tracing::debug!(stream = %publisher.stream_name(), "Publish queue drained");
}
