//! In-memory event stream.
//!
//! Emulates Redis Streams consumer-group semantics inside one process:
//! monotonic `<millis>-<seq>` entry ids, a per-group delivery cursor, a
//! per-group pending set keyed by entry id, and blocking reads that wake up
//! on append.

use super::{
    EventStream, GroupInfo, ReadCursor, ReadOptions, StreamEntry, StreamError, StreamInfo,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct EntryId {
    millis: u64,
    seq: u64,
}

impl EntryId {
    fn next_after(last: Self) -> Self {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        if now > last.millis {
            Self { millis: now, seq: 0 }
        } else {
            Self {
                millis: last.millis,
                seq: last.seq + 1,
            }
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    index: usize,
}

#[derive(Debug, Default)]
struct GroupState {
    next_index: usize,
    pending: BTreeMap<String, PendingEntry>,
    consumers: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<(EntryId, HashMap<String, String>)>,
    last_id: EntryId,
    groups: BTreeMap<String, GroupState>,
}

/// In-memory stream implementation.
///
/// Suitable for development and tests. Data is lost when the process exits.
///
/// # Example
///
/// ```
/// use shared::stream::{EventStream, InMemoryStream, ReadOptions};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let stream = InMemoryStream::new();
/// stream.create_group("logs", "workers").await.unwrap();
/// stream.append("logs", &[("service".to_string(), "api".to_string())]).await.unwrap();
///
/// let batch = stream
///     .read_group("logs", "workers", "w1", ReadOptions::new_entries(10, Duration::ZERO))
///     .await
///     .unwrap();
/// assert_eq!(batch.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStream {
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
}

impl InMemoryStream {
    /// Creates an empty stream store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StreamState>>, StreamError> {
        self.streams
            .lock()
            .map_err(|_| StreamError::Transport("in-memory stream lock poisoned".to_string()))
    }

    fn take_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        options: ReadOptions,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut streams = self.lock()?;
        let missing = || StreamError::GroupMissing {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        let state = streams.get_mut(stream).ok_or_else(missing)?;
        let group_state = state.groups.get_mut(group).ok_or_else(missing)?;
        group_state.consumers.insert(consumer.to_string());

        let batch = match options.cursor {
            ReadCursor::New => {
                let end = state
                    .entries
                    .len()
                    .min(group_state.next_index.saturating_add(options.count));
                let mut batch = Vec::with_capacity(end.saturating_sub(group_state.next_index));
                for index in group_state.next_index..end {
                    let (id, fields) = &state.entries[index];
                    let id = id.to_string();
                    group_state.pending.insert(
                        id.clone(),
                        PendingEntry {
                            consumer: consumer.to_string(),
                            index,
                        },
                    );
                    batch.push(StreamEntry {
                        id,
                        fields: fields.clone(),
                    });
                }
                group_state.next_index = group_state.next_index.max(end);
                batch
            }
            ReadCursor::Pending => {
                let mut own: Vec<&PendingEntry> = group_state
                    .pending
                    .values()
                    .filter(|p| p.consumer == consumer)
                    .collect();
                own.sort_by_key(|p| p.index);
                own.into_iter()
                    .take(options.count)
                    .map(|p| {
                        let (id, fields) = &state.entries[p.index];
                        StreamEntry {
                            id: id.to_string(),
                            fields: fields.clone(),
                        }
                    })
                    .collect()
            }
        };

        Ok(batch)
    }
}

#[async_trait]
impl EventStream for InMemoryStream {
    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError> {
        let id = {
            let mut streams = self.lock()?;
            let state = streams.entry(stream.to_string()).or_default();
            let id = EntryId::next_after(state.last_id);
            state.last_id = id;
            state.entries.push((id, fields.iter().cloned().collect()));
            id
        };
        self.appended.notify_waiters();
        Ok(id.to_string())
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut streams = self.lock()?;
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        options: ReadOptions,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let deadline = Instant::now() + options.block;
        loop {
            // Register interest before checking so an append between the
            // check and the wait is not missed.
            let appended = self.appended.notified();

            let batch = self.take_batch(stream, group, consumer, options)?;
            if !batch.is_empty() || options.cursor == ReadCursor::Pending {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(deadline - now, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize, StreamError> {
        let mut streams = self.lock()?;
        let Some(group_state) = streams
            .get_mut(stream)
            .and_then(|state| state.groups.get_mut(group))
        else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter(|id| group_state.pending.remove(id.as_str()).is_some())
            .count())
    }

    async fn info(&self, stream: &str) -> Result<StreamInfo, StreamError> {
        let streams = self.lock()?;
        let Some(state) = streams.get(stream) else {
            return Ok(StreamInfo::default());
        };
        let groups = state
            .groups
            .iter()
            .map(|(name, group)| GroupInfo {
                name: name.clone(),
                consumers: group.consumers.len(),
                pending: group.pending.len(),
                last_delivered_id: group
                    .next_index
                    .checked_sub(1)
                    .map_or_else(|| "0-0".to_string(), |i| state.entries[i].0.to_string()),
            })
            .collect();
        Ok(StreamInfo {
            length: state.entries.len(),
            groups,
        })
    }

    async fn ping(&self) -> Result<(), StreamError> {
        self.lock().map(|_| ())
    }
}
