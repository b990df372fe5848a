//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use crate::db::DatabaseConfig;
use anyhow::{Context, Result};
use shared::config::PipelineConfig;
use std::net::SocketAddr;

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `LOGSCALE_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `LOGSCALE_PORT`: The port to listen on (default: 8080)
/// - `REDIS_URL`: Redis for event publishing (default: unset, publishing disabled)
/// - `DATABASE_URL`: Postgres for service metrics (default: unset, in-memory)
/// - `CLICKHOUSE_URL` and friends: `ClickHouse` for log rows (default: unset, in-memory)
///
/// Pipeline settings are read by [`PipelineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Redis URL for the event stream.
    pub redis_url: Option<String>,
    /// Postgres URL for service metrics.
    pub database_url: Option<String>,
    /// `ClickHouse` settings for log storage.
    pub clickhouse: Option<DatabaseConfig>,
    /// Stream and queue settings.
    pub pipeline: PipelineConfig,
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `LOGSCALE_PORT` is set but cannot be parsed as a valid port number
    /// - a numeric pipeline variable is malformed
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("LOGSCALE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("LOGSCALE_PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("LOGSCALE_PORT must be a valid port number")?
            .unwrap_or(8080);

        Ok(Self {
            host,
            port,
            redis_url: non_empty_var("REDIS_URL"),
            database_url: non_empty_var("DATABASE_URL"),
            clickhouse: DatabaseConfig::from_env(),
            pipeline: PipelineConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redis_url: None,
            database_url: None,
            clickhouse: None,
            pipeline: PipelineConfig::default(),
        }
    }
}
