//! Pipeline settings loaded from the environment.

use crate::pipeline::{WorkerConfig, DEFAULT_CONSUMER, DEFAULT_GROUP};
use std::time::Duration;
use thiserror::Error;

/// Default stream name.
pub const DEFAULT_STREAM_NAME: &str = "logscale:logs";

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Settings shared by the publisher and the worker.
///
/// Configuration values can be set via environment variables:
/// - `STREAM_NAME`: stream to publish to and consume from (default: "logscale:logs")
/// - `CONSUMER_GROUP`: consumer group name (default: "logscale-workers")
/// - `CONSUMER_NAME`: this worker's identity in the group (default: "worker-1")
/// - `WORKER_BATCH_SIZE`: entries per read (default: 10)
/// - `WORKER_BLOCK_MS`: read block timeout in milliseconds (default: 1000)
/// - `WORKER_RETRY_DELAY_MS`: pause after a failed read (default: 5000)
/// - `DEAD_LETTER_STREAM`: where unprocessable entries go (default: unset, drop)
/// - `PUBLISH_QUEUE_CAPACITY`: bounded publish queue size (default: 1024)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Stream name.
    pub stream_name: String,
    /// Consumer group name.
    pub consumer_group: String,
    /// Consumer name.
    pub consumer_name: String,
    /// Entries per read.
    pub batch_size: usize,
    /// Read block timeout.
    pub block_timeout: Duration,
    /// Pause after a failed read.
    pub retry_delay: Duration,
    /// Dead-letter stream, if enabled.
    pub dead_letter_stream: Option<String>,
    /// Publish queue capacity.
    pub publish_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            consumer_group: DEFAULT_GROUP.to_string(),
            consumer_name: DEFAULT_CONSUMER.to_string(),
            batch_size: 10,
            block_timeout: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(5000),
            dead_letter_stream: None,
            publish_queue_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but is not a positive
    /// integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric value is set but is not a positive
    /// integer.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(raw) => {
                    let parsed = raw.trim().parse::<u64>();
                    match parsed {
                        Ok(n) if n > 0 => Ok(n),
                        _ => Err(ConfigError::Invalid { key, value: raw }),
                    }
                }
            }
        };

        let to_usize = |key: &'static str, n: u64| {
            usize::try_from(n).map_err(|_| ConfigError::Invalid {
                key,
                value: n.to_string(),
            })
        };

        Ok(Self {
            stream_name: get("STREAM_NAME").unwrap_or(defaults.stream_name),
            consumer_group: get("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            consumer_name: get("CONSUMER_NAME").unwrap_or(defaults.consumer_name),
            batch_size: to_usize("WORKER_BATCH_SIZE", number("WORKER_BATCH_SIZE", 10)?)?,
            block_timeout: Duration::from_millis(number("WORKER_BLOCK_MS", 1000)?),
            retry_delay: Duration::from_millis(number("WORKER_RETRY_DELAY_MS", 5000)?),
            dead_letter_stream: get("DEAD_LETTER_STREAM"),
            publish_queue_capacity: to_usize(
                "PUBLISH_QUEUE_CAPACITY",
                number("PUBLISH_QUEUE_CAPACITY", 1024)?,
            )?,
        })
    }

    /// Returns the worker settings described by this configuration.
    #[must_use]
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            stream: self.stream_name.clone(),
            group: self.consumer_group.clone(),
            consumer: self.consumer_name.clone(),
            batch_size: self.batch_size,
            block_timeout: self.block_timeout,
            retry_delay: self.retry_delay,
            dead_letter_stream: self.dead_letter_stream.clone(),
        }
    }
}
