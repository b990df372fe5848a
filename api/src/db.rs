//! Database connection module.
//!
//! `ClickHouse` holds raw log rows and Postgres holds per-service metrics.
//! Both are optional; without them the server falls back to in-memory stores.

use anyhow::{Context, Result};
use clickhouse::Client;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `ClickHouse` configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `ClickHouse` database URL (e.g., <http://localhost:8123>)
    pub url: String,
    /// Database name to use
    pub database: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: String,
}

impl DatabaseConfig {
    /// Loads `ClickHouse` configuration from environment variables.
    ///
    /// Returns `None` when `CLICKHOUSE_URL` is unset.
    ///
    /// # Environment Variables
    ///
    /// - `CLICKHOUSE_URL`: Database URL
    /// - `CLICKHOUSE_DB`: Database name (default: "logscale")
    /// - `CLICKHOUSE_USER`: Database user (default: "default")
    /// - `CLICKHOUSE_PASSWORD`: Database password (default: empty)
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("CLICKHOUSE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        Some(Self {
            url,
            database: std::env::var("CLICKHOUSE_DB").unwrap_or_else(|_| "logscale".to_string()),
            user: std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
            password: std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
        })
    }
}

/// `ClickHouse` client wrapper.
#[derive(Clone)]
pub struct Database {
    client: Arc<Client>,
}

impl Database {
    /// Create a new database client from configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// # use api::db::{Database, DatabaseConfig};
    /// let config = DatabaseConfig {
    ///     url: "http://localhost:8123".to_string(),
    ///     database: "logscale".to_string(),
    ///     user: "default".to_string(),
    ///     password: String::new(),
    /// };
    /// let db = Database::new(&config);
    /// ```
    #[must_use]
    pub fn new(config: &DatabaseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);

        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying `ClickHouse` client.
    #[must_use]
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }
}

/// Opens a Postgres pool and checks it with one connection.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the server cannot be reached
/// within five seconds.
pub async fn connect_postgres(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(url)
        .await
        .context("Failed to connect to Postgres")
}
