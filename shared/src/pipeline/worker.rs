//! The stream consumer loop.
//!
//! A [`Worker`] claims batches from a consumer group, decodes each entry,
//! folds it into the [`MetricsAggregator`], and acknowledges it. Entries that
//! cannot be processed are acknowledged as well, so one bad entry never
//! blocks the ones behind it. They are optionally copied to a dead-letter
//! stream first.

use super::aggregator::{AggregationError, MetricsAggregator};
use crate::models::{DeadLetterEvent, ServiceMetrics};
use crate::stream::{
    decode_event, encode_dead_letter, DecodeError, EventStream, ReadOptions, StreamEntry,
    StreamError,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "logscale-workers";

/// Default consumer name.
pub const DEFAULT_CONSUMER: &str = "worker-1";

/// Why a single entry could not be processed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The entry's fields do not form a valid event.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The event could not be folded into its service's metrics.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Stream to consume.
    pub stream: String,
    /// Consumer group name.
    pub group: String,
    /// This worker's identity within the group.
    pub consumer: String,
    /// Maximum entries per read.
    pub batch_size: usize,
    /// How long one read waits for new entries.
    pub block_timeout: Duration,
    /// Pause after a failed read.
    pub retry_delay: Duration,
    /// Where unprocessable entries are copied, if anywhere.
    pub dead_letter_stream: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stream: crate::config::DEFAULT_STREAM_NAME.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: DEFAULT_CONSUMER.to_string(),
            batch_size: 10,
            block_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            dead_letter_stream: None,
        }
    }
}

impl WorkerConfig {
    /// Sets the stream name.
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Sets the consumer group name.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets the consumer name.
    #[must_use]
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Sets the maximum entries per read (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the read block timeout.
    #[must_use]
    pub fn with_block_timeout(mut self, block_timeout: Duration) -> Self {
        self.block_timeout = block_timeout;
        self
    }

    /// Sets the pause after a failed read.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Enables dead-lettering to `stream`.
    #[must_use]
    pub fn with_dead_letter_stream(mut self, stream: impl Into<String>) -> Self {
        self.dead_letter_stream = Some(stream.into());
        self
    }
}

/// Counters describing what a worker did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Entries decoded and aggregated.
    pub processed: u64,
    /// Entries that failed decode or aggregation.
    pub failed: u64,
    /// Entries removed from the pending set.
    pub acknowledged: u64,
    /// Failed entries copied to the dead-letter stream.
    pub dead_lettered: u64,
    /// Reads that failed at the transport level.
    pub read_errors: u64,
}

impl WorkerStats {
    fn merge(&mut self, other: &Self) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.acknowledged += other.acknowledged;
        self.dead_lettered += other.dead_lettered;
        self.read_errors += other.read_errors;
    }
}

/// Consumes a stream through a consumer group and feeds the aggregator.
pub struct Worker {
    stream: Arc<dyn EventStream>,
    aggregator: MetricsAggregator,
    config: WorkerConfig,
}

impl Worker {
    /// Creates a worker.
    pub fn new(
        stream: Arc<dyn EventStream>,
        aggregator: MetricsAggregator,
        config: WorkerConfig,
    ) -> Self {
        Self {
            stream,
            aggregator,
            config,
        }
    }

    /// Returns the worker's settings.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Runs until `cancel` fires and returns what was done.
    ///
    /// Creates the consumer group if needed, then re-processes entries still
    /// pending for this consumer from an earlier run, then consumes new
    /// entries. Cancellation is checked before every read; a batch that is
    /// already being processed is finished first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the consumer group cannot be created. Read
    /// failures are retried after `retry_delay`.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WorkerStats, StreamError> {
        let cfg = &self.config;
        self.stream.create_group(&cfg.stream, &cfg.group).await?;
        tracing::info!(
            stream = %cfg.stream,
            group = %cfg.group,
            consumer = %cfg.consumer,
            "Worker started"
        );

        let mut stats = self.recover_pending(&cancel).await;

        while !cancel.is_cancelled() {
            let options = ReadOptions::new_entries(cfg.batch_size, cfg.block_timeout);
            match self
                .stream
                .read_group(&cfg.stream, &cfg.group, &cfg.consumer, options)
                .await
            {
                Ok(entries) => {
                    if !entries.is_empty() {
                        stats.merge(&self.process_batch(&entries).await);
                    }
                }
                Err(err) => {
                    stats.read_errors += 1;
                    tracing::error!(
                        stream = %cfg.stream,
                        error = %err,
                        retry_in_ms = u64::try_from(cfg.retry_delay.as_millis()).unwrap_or(u64::MAX),
                        "Failed to read from stream"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(cfg.retry_delay) => {}
                        () = cancel.cancelled() => break,
                    }
                    if matches!(err, StreamError::GroupMissing { .. }) {
                        self.recreate_group().await;
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.processed,
            failed = stats.failed,
            acknowledged = stats.acknowledged,
            dead_lettered = stats.dead_lettered,
            read_errors = stats.read_errors,
            "Worker stopped"
        );
        Ok(stats)
    }

    async fn recover_pending(&self, cancel: &CancellationToken) -> WorkerStats {
        let cfg = &self.config;
        let mut stats = WorkerStats::default();

        while !cancel.is_cancelled() {
            let entries = match self
                .stream
                .read_group(
                    &cfg.stream,
                    &cfg.group,
                    &cfg.consumer,
                    ReadOptions::pending(cfg.batch_size),
                )
                .await
            {
                Ok(entries) => entries,
                Err(err) => {
                    stats.read_errors += 1;
                    tracing::warn!(error = %err, "Failed to read pending entries, skipping recovery");
                    break;
                }
            };
            if entries.is_empty() {
                break;
            }

            tracing::info!(count = entries.len(), "Reprocessing pending entries");
            let batch = self.process_batch(&entries).await;
            stats.merge(&batch);
            // Nothing left the pending set, so the next read would return the same batch.
            if batch.acknowledged == 0 {
                break;
            }
        }
        stats
    }

    async fn recreate_group(&self) {
        let cfg = &self.config;
        if let Err(err) = self.stream.create_group(&cfg.stream, &cfg.group).await {
            tracing::warn!(group = %cfg.group, error = %err, "Failed to recreate consumer group");
        }
    }

    /// Processes and acknowledges every entry of `entries`, in order.
    ///
    /// Every entry is acknowledged whether or not it was processed. Failures
    /// are logged and, if configured, dead-lettered.
    pub async fn process_batch(&self, entries: &[StreamEntry]) -> WorkerStats {
        let cfg = &self.config;
        let mut stats = WorkerStats::default();

        for entry in entries {
            match self.process_entry(entry).await {
                Ok(metrics) => {
                    stats.processed += 1;
                    tracing::debug!(
                        entry_id = %entry.id,
                        service = %metrics.service,
                        total_logs = metrics.total_logs,
                        "Processed entry"
                    );
                }
                Err(err) => {
                    stats.failed += 1;
                    tracing::warn!(entry_id = %entry.id, error = %err, "Failed to process entry");
                    if self.dead_letter(entry, &err).await {
                        stats.dead_lettered += 1;
                    }
                }
            }

            match self
                .stream
                .ack(&cfg.stream, &cfg.group, std::slice::from_ref(&entry.id))
                .await
            {
                Ok(acked) => stats.acknowledged += acked as u64,
                Err(err) => {
                    tracing::error!(entry_id = %entry.id, error = %err, "Failed to acknowledge entry");
                }
            }
        }
        stats
    }

    async fn process_entry(&self, entry: &StreamEntry) -> Result<ServiceMetrics, ProcessError> {
        let event = decode_event(&entry.fields)?;
        Ok(self.aggregator.apply(&event).await?)
    }

    async fn dead_letter(&self, entry: &StreamEntry, err: &ProcessError) -> bool {
        let Some(target) = &self.config.dead_letter_stream else {
            return false;
        };

        let dead = DeadLetterEvent {
            id: Uuid::new_v4().to_string(),
            original_id: entry.id.clone(),
            event: serde_json::to_string(&entry.fields).unwrap_or_default(),
            error: err.to_string(),
            retry_count: 0,
            failed_at: Utc::now(),
            stream_name: self.config.stream.clone(),
        };

        match self.stream.append(target, &encode_dead_letter(&dead)).await {
            Ok(dead_id) => {
                tracing::info!(entry_id = %entry.id, dead_letter_id = %dead_id, "Dead-lettered entry");
                true
            }
            Err(append_err) => {
                tracing::error!(
                    entry_id = %entry.id,
                    error = %append_err,
                    "Failed to dead-letter entry"
                );
                false
            }
        }
    }
}
