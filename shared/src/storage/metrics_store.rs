//! Per-service metrics storage.
//!
//! Every store applies an event to a service's row as one atomic
//! read-modify-write. Applies for the same service are serialized; applies
//! for different services do not contend.

use crate::models::{LogEvent, ServiceMetrics};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur during metrics store operations.
#[derive(Debug, Error)]
pub enum MetricsStoreError {
    /// No metrics row exists for the service.
    #[error("No metrics for service: {0}")]
    NotFound(String),

    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on metrics store")]
    LockError,

    /// Generic storage error.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<sqlx::Error> for MetricsStoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

/// Trait for metrics storage implementations.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Applies one event to its service's row, creating the row on first
    /// sight, and returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-modify-write cannot be completed. No
    /// partial update is visible in that case.
    async fn apply(&self, event: &LogEvent) -> Result<ServiceMetrics, MetricsStoreError>;

    /// Returns the row for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsStoreError::NotFound`] if the service has no row.
    async fn get(&self, service: &str) -> Result<ServiceMetrics, MetricsStoreError>;

    /// Returns all rows ordered by service name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list(&self) -> Result<Vec<ServiceMetrics>, MetricsStoreError>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not respond.
    async fn ping(&self) -> Result<(), MetricsStoreError>;
}

const DEFAULT_SHARDS: usize = 16;

/// In-memory metrics store.
///
/// Rows live in a fixed set of shards selected by hashing the service name.
/// Each apply holds only its shard's lock for the duration of the
/// read-modify-write.
///
/// **Note:** Data is not persisted across restarts.
#[derive(Debug)]
pub struct InMemoryMetricsStore {
    shards: Vec<Mutex<HashMap<String, ServiceMetrics>>>,
}

impl Default for InMemoryMetricsStore {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl InMemoryMetricsStore {
    /// Creates an empty store with the default shard count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with `shards` shards (at least one).
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// Creates a new in-memory metrics store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn shard(&self, service: &str) -> &Mutex<HashMap<String, ServiceMetrics>> {
        let mut hasher = DefaultHasher::new();
        service.hash(&mut hasher);
        // The modulo keeps the value below `shards.len()`, so it fits in usize.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn apply(&self, event: &LogEvent) -> Result<ServiceMetrics, MetricsStoreError> {
        let now = Utc::now();
        let mut rows = self
            .shard(&event.service)
            .lock()
            .map_err(|_| MetricsStoreError::LockError)?;

        let row = rows
            .entry(event.service.clone())
            .or_insert_with(|| ServiceMetrics::new(event.service.clone(), event.timestamp, now));
        row.record(event, now);
        Ok(row.clone())
    }

    async fn get(&self, service: &str) -> Result<ServiceMetrics, MetricsStoreError> {
        let rows = self
            .shard(service)
            .lock()
            .map_err(|_| MetricsStoreError::LockError)?;
        rows.get(service)
            .cloned()
            .ok_or_else(|| MetricsStoreError::NotFound(service.to_string()))
    }

    async fn list(&self) -> Result<Vec<ServiceMetrics>, MetricsStoreError> {
        let mut all = Vec::new();
        for shard in &self.shards {
            let rows = shard.lock().map_err(|_| MetricsStoreError::LockError)?;
            all.extend(rows.values().cloned());
        }
        all.sort_by(|a, b| a.service.cmp(&b.service));
        Ok(all)
    }

    async fn ping(&self) -> Result<(), MetricsStoreError> {
        Ok(())
    }
}

const METRICS_COLUMNS: &str = "service, total_logs, error_count, warning_count, info_count, \
     debug_count, error_rate, last_log_time, created_at, updated_at";

/// Postgres-backed metrics store.
///
/// One row per service in `service_metrics`, keyed by a unique `service`
/// column. Each apply runs in its own transaction and locks the row with
/// `SELECT ... FOR UPDATE`, so concurrent applies for one service queue
/// behind each other.
#[derive(Debug, Clone)]
pub struct PostgresMetricsStore {
    pool: PgPool,
}

impl PostgresMetricsStore {
    /// Creates a store on an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `service_metrics` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    pub async fn migrate(&self) -> Result<(), MetricsStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS service_metrics (
                service TEXT PRIMARY KEY,
                total_logs BIGINT NOT NULL DEFAULT 0,
                error_count BIGINT NOT NULL DEFAULT 0,
                warning_count BIGINT NOT NULL DEFAULT 0,
                info_count BIGINT NOT NULL DEFAULT 0,
                debug_count BIGINT NOT NULL DEFAULT 0,
                error_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
                last_log_time TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for PostgresMetricsStore {
    async fn apply(&self, event: &LogEvent) -> Result<ServiceMetrics, MetricsStoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Seed a zeroed row so the FOR UPDATE below always has a row to lock.
        sqlx::query(
            "INSERT INTO service_metrics (service, last_log_time, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (service) DO NOTHING",
        )
        .bind(&event.service)
        .bind(event.timestamp)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut row: ServiceMetrics = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM service_metrics WHERE service = $1 FOR UPDATE"
        ))
        .bind(&event.service)
        .fetch_one(&mut *tx)
        .await?;

        row.record(event, now);

        sqlx::query(
            "UPDATE service_metrics
             SET total_logs = $2, error_count = $3, warning_count = $4, info_count = $5,
                 debug_count = $6, error_rate = $7, last_log_time = $8, updated_at = $9
             WHERE service = $1",
        )
        .bind(&row.service)
        .bind(row.total_logs)
        .bind(row.error_count)
        .bind(row.warning_count)
        .bind(row.info_count)
        .bind(row.debug_count)
        .bind(row.error_rate)
        .bind(row.last_log_time)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn get(&self, service: &str) -> Result<ServiceMetrics, MetricsStoreError> {
        sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM service_metrics WHERE service = $1"
        ))
        .bind(service)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetricsStoreError::NotFound(service.to_string()))
    }

    async fn list(&self) -> Result<Vec<ServiceMetrics>, MetricsStoreError> {
        let rows: Vec<ServiceMetrics> = sqlx::query_as(&format!(
            "SELECT {METRICS_COLUMNS} FROM service_metrics ORDER BY service"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), MetricsStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use sqlx::postgres::PgPoolOptions;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn event(service: &str, level: &str, hour: u32) -> LogEvent {
        LogEvent::new("id", service, level, "msg", at(hour))
    }

    #[tokio::test]
    async fn test_first_apply_creates_row() {
        let store = InMemoryMetricsStore::new();

        let row = store.apply(&event("auth", "error", 3)).await.unwrap();

        assert_eq!(row.service, "auth");
        assert_eq!(row.total_logs, 1);
        assert_eq!(row.error_count, 1);
        assert_eq!(row.last_log_time, at(3));
        assert!((row.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_get_unknown_service_is_not_found() {
        let store = InMemoryMetricsStore::new();

        let err = store.get("nope").await.unwrap_err();

        assert!(matches!(err, MetricsStoreError::NotFound(ref s) if s == "nope"));
    }

    #[tokio::test]
    async fn test_services_are_independent() {
        let store = InMemoryMetricsStore::new();
        store.apply(&event("auth", "error", 1)).await.unwrap();
        store.apply(&event("billing", "info", 1)).await.unwrap();
        store.apply(&event("billing", "info", 2)).await.unwrap();

        assert_eq!(store.get("auth").await.unwrap().total_logs, 1);
        let billing = store.get("billing").await.unwrap();
        assert_eq!(billing.total_logs, 2);
        assert_eq!(billing.error_count, 0);
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_service() {
        let store = InMemoryMetricsStore::new();
        for service in ["zeta", "alpha", "mid"] {
            store.apply(&event(service, "info", 1)).await.unwrap();
        }

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.service)
            .collect();

        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_single_shard_store_still_separates_services() {
        let store = InMemoryMetricsStore::with_shards(0);
        store.apply(&event("a", "warn", 1)).await.unwrap();
        store.apply(&event("b", "debug", 1)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().warning_count, 1);
        assert_eq!(store.get("b").await.unwrap().debug_count, 1);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_do_not_lose_increments() {
        let store = Arc::new(InMemoryMetricsStore::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    let level = if i % 5 == 0 { "error" } else { "info" };
                    store.apply(&event("auth", level, 1)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let row = store.get("auth").await.unwrap();
        assert_eq!(row.total_logs, 2000);
        assert_eq!(row.error_count, 400);
        assert_eq!(row.info_count, 1600);
        assert!((row.error_rate - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres at DATABASE_URL"]
    async fn test_postgres_apply_roundtrip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PostgresMetricsStore::new(pool);
        store.migrate().await.unwrap();

        let service = format!("test-{}", uuid::Uuid::new_v4());
        store.apply(&event(&service, "error", 1)).await.unwrap();
        store.apply(&event(&service, "info", 2)).await.unwrap();

        let row = store.get(&service).await.unwrap();
        assert_eq!(row.total_logs, 2);
        assert_eq!(row.error_count, 1);
        assert_eq!(row.last_log_time, at(2));
        assert!((row.error_rate - 0.5).abs() < 1e-12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires a running Postgres at DATABASE_URL"]
    async fn test_postgres_concurrent_applies_do_not_lose_increments() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        let store = Arc::new(PostgresMetricsStore::new(pool));
        store.migrate().await.unwrap();

        // The row does not exist yet, so the first applies race on the insert too.
        let service = format!("test-{}", uuid::Uuid::new_v4());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let level = if i % 5 == 0 { "error" } else { "info" };
                    store.apply(&event(&service, level, 1)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let row = store.get(&service).await.unwrap();
        assert_eq!(row.total_logs, 400);
        assert_eq!(row.error_count, 80);
        assert_eq!(row.info_count, 320);
        assert!((row.error_rate - 0.2).abs() < 1e-12);
    }
}
