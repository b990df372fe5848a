//! Log storage trait and implementations.
//!
//! Provides the `LogStore` trait for abstracting raw log persistence, an
//! `InMemoryLogStore` for development and testing, and a `ClickHouse`-backed
//! store for production.

use crate::models::{LogRecord, LogRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during log store operations.
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on log store")]
    LockError,

    /// Generic storage error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A timestamp falls outside the range that fits in nanoseconds since the epoch.
    #[error("Timestamp {0} is outside the storable range")]
    TimestampOutOfRange(DateTime<Utc>),
}

impl From<clickhouse::error::Error> for LogStoreError {
    fn from(err: clickhouse::error::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

/// Filters for retrieving logs. All filters are optional and AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Service name (exact match).
    pub service: Option<String>,

    /// Level (exact match).
    pub level: Option<String>,

    /// Earliest timestamp (inclusive).
    pub start_time: Option<DateTime<Utc>>,

    /// Latest timestamp (inclusive).
    pub end_time: Option<DateTime<Utc>>,
}

impl LogFilter {
    /// Creates an empty filter (matches all logs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service filter.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the level filter.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Sets the start of the time range.
    #[must_use]
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Sets the end of the time range.
    #[must_use]
    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Returns true if `record` passes every filter.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.service.as_ref().is_none_or(|s| &record.service == s)
            && self.level.as_ref().is_none_or(|l| &record.level == l)
            && self.start_time.is_none_or(|start| record.timestamp >= start)
            && self.end_time.is_none_or(|end| record.timestamp <= end)
    }
}

/// Result of a log query operation.
#[derive(Debug, Clone)]
pub struct LogQueryResult {
    /// The page of logs matching the query, newest first.
    pub logs: Vec<LogRecord>,

    /// Total count of matching logs (before limit/offset applied).
    pub total_count: usize,
}

/// Trait for log storage implementations.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Stores one log, assigning its id and defaulting its timestamp to now.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert(&self, request: LogRequest) -> Result<LogRecord, LogStoreError>;

    /// Stores several logs; either all are stored or none are.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert_batch(&self, requests: Vec<LogRequest>) -> Result<Vec<LogRecord>, LogStoreError>;

    /// Returns one page of matching logs ordered by timestamp descending,
    /// together with the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    async fn query(
        &self,
        filter: &LogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<LogQueryResult, LogStoreError>;

    /// Returns the total number of logs in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the count operation fails.
    async fn count(&self) -> Result<usize, LogStoreError>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not respond.
    async fn ping(&self) -> Result<(), LogStoreError>;
}

/// In-memory log store implementation.
///
/// This implementation stores logs in a `Vec` protected by a `RwLock`.
/// It is suitable for development, testing, and single-node deployments
/// with limited data volumes.
///
/// **Note:** Data is not persisted across restarts.
///
/// # Example
///
/// ```
/// use shared::models::LogRequest;
/// use shared::storage::{InMemoryLogStore, LogFilter, LogStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryLogStore::new();
/// store.insert(LogRequest::new("auth", "error", "boom")).await.unwrap();
///
/// let result = store.query(&LogFilter::new(), 50, 0).await.unwrap();
/// assert_eq!(result.logs.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    logs: Arc<RwLock<Vec<LogRecord>>>,
}

impl InMemoryLogStore {
    /// Creates a new empty in-memory log store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Creates a new in-memory log store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn insert(&self, request: LogRequest) -> Result<LogRecord, LogStoreError> {
        let record = request.into_record(Utc::now());
        let mut logs = self.logs.write().map_err(|_| LogStoreError::LockError)?;
        logs.push(record.clone());
        Ok(record)
    }

    async fn insert_batch(&self, requests: Vec<LogRequest>) -> Result<Vec<LogRecord>, LogStoreError> {
        let now = Utc::now();
        let records: Vec<LogRecord> = requests.into_iter().map(|r| r.into_record(now)).collect();
        let mut logs = self.logs.write().map_err(|_| LogStoreError::LockError)?;
        logs.extend(records.iter().cloned());
        Ok(records)
    }

    async fn query(
        &self,
        filter: &LogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<LogQueryResult, LogStoreError> {
        let logs = self.logs.read().map_err(|_| LogStoreError::LockError)?;

        let mut filtered: Vec<&LogRecord> = logs.iter().filter(|log| filter.matches(log)).collect();
        filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total_count = filtered.len();
        let page = filtered
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(LogQueryResult {
            logs: page,
            total_count,
        })
    }

    async fn count(&self) -> Result<usize, LogStoreError> {
        let logs = self.logs.read().map_err(|_| LogStoreError::LockError)?;
        Ok(logs.len())
    }

    async fn ping(&self) -> Result<(), LogStoreError> {
        self.logs.read().map(|_| ()).map_err(|_| LogStoreError::LockError)
    }
}

const LOG_COLUMNS: &str = "id, service, level, message, timestamp, meta, created_at";

#[derive(clickhouse::Row, serde::Serialize, serde::Deserialize)]
struct LogRow {
    id: String,
    service: String,
    level: String,
    message: String,
    timestamp: i64,
    meta: String,
    created_at: i64,
}

fn to_nanos(at: DateTime<Utc>) -> Result<i64, LogStoreError> {
    at.timestamp_nanos_opt().ok_or(LogStoreError::TimestampOutOfRange(at))
}

impl TryFrom<&LogRecord> for LogRow {
    type Error = LogStoreError;

    fn try_from(record: &LogRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.clone(),
            service: record.service.clone(),
            level: record.level.clone(),
            message: record.message.clone(),
            timestamp: to_nanos(record.timestamp)?,
            meta: record.meta.to_string(),
            created_at: to_nanos(record.created_at)?,
        })
    }
}

impl From<LogRow> for LogRecord {
    fn from(row: LogRow) -> Self {
        let meta = serde_json::from_str(&row.meta).unwrap_or(serde_json::Value::String(row.meta));
        Self {
            id: row.id,
            service: row.service,
            level: row.level,
            message: row.message,
            timestamp: DateTime::from_timestamp_nanos(row.timestamp),
            meta,
            created_at: DateTime::from_timestamp_nanos(row.created_at),
        }
    }
}

/// `ClickHouse`-backed log store implementation.
///
/// Timestamps are stored as nanoseconds since the epoch. Query filters are
/// passed as bound parameters.
#[derive(Clone)]
pub struct ClickHouseLogStore {
    client: Arc<clickhouse::Client>,
}

impl ClickHouseLogStore {
    /// Creates a new `ClickHouse` log store with the given client.
    #[must_use]
    pub fn new(client: Arc<clickhouse::Client>) -> Self {
        Self { client }
    }

    /// Creates a new `ClickHouse` log store wrapped in an Arc.
    #[must_use]
    pub fn new_shared(client: Arc<clickhouse::Client>) -> Arc<Self> {
        Arc::new(Self::new(client))
    }

    /// Creates the `logs` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<(), LogStoreError> {
        self.client
            .query(
                "CREATE TABLE IF NOT EXISTS logs (
                    id String,
                    service LowCardinality(String),
                    level LowCardinality(String),
                    message String,
                    timestamp Int64,
                    meta String,
                    created_at Int64
                ) ENGINE = MergeTree ORDER BY (service, timestamp)",
            )
            .execute()
            .await?;
        Ok(())
    }

    fn where_clause(filter: &LogFilter) -> String {
        let mut conditions = Vec::new();
        if filter.service.is_some() {
            conditions.push("service = ?");
        }
        if filter.level.is_some() {
            conditions.push("level = ?");
        }
        if filter.start_time.is_some() {
            conditions.push("timestamp >= ?");
        }
        if filter.end_time.is_some() {
            conditions.push("timestamp <= ?");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    // Bind order must match `where_clause`.
    fn bind_filter(
        mut query: clickhouse::query::Query,
        filter: &LogFilter,
    ) -> Result<clickhouse::query::Query, LogStoreError> {
        if let Some(service) = &filter.service {
            query = query.bind(service.as_str());
        }
        if let Some(level) = &filter.level {
            query = query.bind(level.as_str());
        }
        if let Some(start) = filter.start_time {
            query = query.bind(to_nanos(start)?);
        }
        if let Some(end) = filter.end_time {
            query = query.bind(to_nanos(end)?);
        }
        Ok(query)
    }

    async fn write_rows(&self, records: &[LogRecord]) -> Result<(), LogStoreError> {
        let rows = records
            .iter()
            .map(LogRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut inserter = self.client.insert::<LogRow>("logs").await?;
        for row in &rows {
            inserter.write(row).await?;
        }
        inserter.end().await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for ClickHouseLogStore {
    async fn insert(&self, request: LogRequest) -> Result<LogRecord, LogStoreError> {
        let record = request.into_record(Utc::now());
        self.write_rows(std::slice::from_ref(&record)).await?;
        Ok(record)
    }

    async fn insert_batch(&self, requests: Vec<LogRequest>) -> Result<Vec<LogRecord>, LogStoreError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let records: Vec<LogRecord> = requests.into_iter().map(|r| r.into_record(now)).collect();
        // One INSERT statement, so the batch lands as a single block.
        self.write_rows(&records).await?;
        Ok(records)
    }

    async fn query(
        &self,
        filter: &LogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<LogQueryResult, LogStoreError> {
        let where_clause = Self::where_clause(filter);

        let count_sql = format!("SELECT count() FROM logs{where_clause}");
        let total_count: u64 = Self::bind_filter(self.client.query(&count_sql), filter)?
            .fetch_one::<u64>()
            .await?;

        let page_sql = format!(
            "SELECT {LOG_COLUMNS} FROM logs{where_clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<LogRow> = Self::bind_filter(self.client.query(&page_sql), filter)?
            .bind(u64::try_from(limit).unwrap_or(u64::MAX))
            .bind(u64::try_from(offset).unwrap_or(u64::MAX))
            .fetch_all::<LogRow>()
            .await?;

        Ok(LogQueryResult {
            logs: rows.into_iter().map(LogRecord::from).collect(),
            total_count: usize::try_from(total_count).unwrap_or(usize::MAX),
        })
    }

    async fn count(&self) -> Result<usize, LogStoreError> {
        let count: u64 = self
            .client
            .query("SELECT count() FROM logs")
            .fetch_one::<u64>()
            .await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn ping(&self) -> Result<(), LogStoreError> {
        self.client.query("SELECT 1").fetch_one::<u8>().await?;
        Ok(())
    }
}
