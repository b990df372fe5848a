//! Redis Streams transport.
//!
//! Entries are written with `XADD`, groups are created with
//! `XGROUP CREATE ... MKSTREAM`, and consumers read with `XREADGROUP`
//! (`>` for new entries, `0` for their own pending entries).

use super::{
    EventStream, GroupInfo, ReadCursor, ReadOptions, StreamEntry, StreamError, StreamInfo,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamInfoGroupsReply, StreamInfoStreamReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed event stream.
#[derive(Clone)]
pub struct RedisStream {
    conn: ConnectionManager,
}

impl RedisStream {
    /// Connects to Redis and verifies the connection with `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the URL is invalid or Redis
    /// does not answer within five seconds.
    pub async fn connect(url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StreamError::Transport(format!("timed out connecting to {url}")))??;

        let stream = Self { conn };
        tokio::time::timeout(CONNECT_TIMEOUT, stream.ping())
            .await
            .map_err(|_| StreamError::Transport("timed out waiting for PING".to_string()))??;

        tracing::debug!("Redis stream connection established");
        Ok(stream)
    }

    fn read_error(stream: &str, group: &str, err: redis::RedisError) -> StreamError {
        if err.code() == Some("NOGROUP") {
            StreamError::GroupMissing {
                stream: stream.to_string(),
                group: group.to_string(),
            }
        } else {
            StreamError::from(err)
        }
    }
}

fn entry_fields(map: &HashMap<String, redis::Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(key, value)| {
            redis::from_redis_value::<String>(value)
                .ok()
                .map(|v| (key.clone(), v))
        })
        .collect()
}

#[async_trait]
impl EventStream for RedisStream {
    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        options: ReadOptions,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();

        let mut read_options = StreamReadOptions::default()
            .group(group, consumer)
            .count(options.count);
        let start = match options.cursor {
            ReadCursor::New => {
                if !options.block.is_zero() {
                    let block_ms = usize::try_from(options.block.as_millis()).unwrap_or(usize::MAX);
                    read_options = read_options.block(block_ms);
                }
                ">"
            }
            ReadCursor::Pending => "0",
        };

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[start], &read_options)
            .await
            .map_err(|err| Self::read_error(stream, group, err))?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|entry| StreamEntry {
                        fields: entry_fields(&entry.map),
                        id: entry.id,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize, StreamError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let acked: usize = conn.xack(stream, group, ids).await?;
        Ok(acked)
    }

    async fn info(&self, stream: &str) -> Result<StreamInfo, StreamError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(stream).await?;
        if !exists {
            return Ok(StreamInfo::default());
        }

        let summary: StreamInfoStreamReply = conn.xinfo_stream(stream).await?;
        let groups: StreamInfoGroupsReply = conn.xinfo_groups(stream).await?;

        Ok(StreamInfo {
            length: summary.length,
            groups: groups
                .groups
                .into_iter()
                .map(|g| GroupInfo {
                    name: g.name,
                    consumers: g.consumers,
                    pending: g.pending,
                    last_delivered_id: g.last_delivered_id,
                })
                .collect(),
        })
    }

    async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
