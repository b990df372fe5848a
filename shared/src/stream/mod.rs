//! Durable event stream abstractions.
//!
//! The `EventStream` trait models an append-only stream with consumer
//! groups: a group is a shared read cursor, every entry is delivered to one
//! consumer of the group, and delivered entries stay pending until they are
//! acknowledged. `RedisStream` maps this onto Redis Streams and
//! `InMemoryStream` emulates it for development and tests.

pub mod codec;
pub mod memory;
pub mod publisher;
pub mod redis_stream;

pub use codec::{decode_event, encode_dead_letter, encode_event, DecodeError};
pub use memory::InMemoryStream;
pub use publisher::{PublishQueue, StreamPublisher};
pub use redis_stream::RedisStream;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the stream transport.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection, timeout or protocol failure.
    #[error("Stream transport error: {0}")]
    Transport(String),

    /// The consumer group has not been created on the stream.
    #[error("Consumer group '{group}' does not exist on stream '{stream}'")]
    GroupMissing {
        /// Stream name.
        stream: String,
        /// Group name.
        group: String,
    },
}

impl From<redis::RedisError> for StreamError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// One entry read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Transport-assigned, ordering-monotonic entry id.
    pub id: String,
    /// Flat field set carried by the entry.
    pub fields: HashMap<String, String>,
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadCursor {
    /// Entries never delivered to any consumer of the group.
    #[default]
    New,
    /// Entries already delivered to this consumer but not yet acknowledged.
    Pending,
}

/// Options for a consumer group read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Which entries to read.
    pub cursor: ReadCursor,
    /// Maximum number of entries to return.
    pub count: usize,
    /// How long to wait for new entries when none are available.
    /// Ignored for [`ReadCursor::Pending`].
    pub block: Duration,
}

impl ReadOptions {
    /// Reads up to `count` new entries, waiting at most `block`.
    #[must_use]
    pub fn new_entries(count: usize, block: Duration) -> Self {
        Self {
            cursor: ReadCursor::New,
            count,
            block,
        }
    }

    /// Reads up to `count` entries pending for the calling consumer.
    #[must_use]
    pub fn pending(count: usize) -> Self {
        Self {
            cursor: ReadCursor::Pending,
            count,
            block: Duration::ZERO,
        }
    }
}

/// Summary of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Number of consumers that have read from the group.
    pub consumers: usize,
    /// Entries delivered but not yet acknowledged.
    pub pending: usize,
    /// Id of the last entry delivered to the group.
    pub last_delivered_id: String,
}

/// Summary of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StreamInfo {
    /// Number of entries in the stream.
    pub length: usize,
    /// Consumer groups attached to the stream.
    pub groups: Vec<GroupInfo>,
}

/// A durable append-only stream with consumer groups.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Appends an entry and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the append fails.
    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError>;

    /// Creates a consumer group that starts at the beginning of the stream,
    /// creating the stream if needed. An existing group is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the command fails.
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Reads entries for `consumer` in `group`.
    ///
    /// Returns an empty batch when nothing arrives within the block timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::GroupMissing`] if the group does not exist and
    /// [`StreamError::Transport`] on connection failure.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        options: ReadOptions,
    ) -> Result<Vec<StreamEntry>, StreamError>;

    /// Acknowledges entries, removing them from the group's pending set.
    /// Returns how many entries were actually pending.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the command fails.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize, StreamError>;

    /// Describes the stream and its groups.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the command fails.
    async fn info(&self, stream: &str) -> Result<StreamInfo, StreamError>;

    /// Checks connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the transport is unreachable.
    async fn ping(&self) -> Result<(), StreamError>;
}
