//! LogScale API Server
//!
//! This crate provides the HTTP server for LogScale. It stores incoming logs,
//! publishes each stored log to the event stream for the metrics worker, and
//! serves logs and per-service metrics.
//!
//! # Architecture
//!
//! The API server is built on Axum and Tokio, providing:
//! - `POST /v1/logs` and `GET /v1/logs` for ingestion and paginated queries
//! - `GET /v1/metrics` and `GET /v1/metrics/{service}` for service metrics
//! - `GET /health` for load balancers
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
pub mod db;
pub mod error;
pub mod pagination;
mod routes;
mod state;

pub use config::Config;
pub use routes::{BatchCreatedResponse, HealthResponse};
pub use state::AppState;

use anyhow::{Context, Result};
use axum::Router;
use shared::pipeline::{MetricsAggregator, Worker, WorkerStats};
use shared::storage::{ClickHouseLogStore, InMemoryLogStore, LogStore, PostgresMetricsStore};
use shared::stream::{InMemoryStream, PublishQueue, RedisStream, StreamError, StreamPublisher};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Runs the LogScale API server.
///
/// This function initializes the server with configuration from environment variables
/// and starts listening for incoming connections. It handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - A configured backend cannot be reached
/// - The server fails to bind to the configured address
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    run_server_with_config(config).await
}

/// Runs the LogScale API server with the provided configuration.
///
/// This is useful for testing or when you want to provide configuration programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - A configured backend cannot be reached
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "LogScale API server starting"
    );

    let (state, tasks) = build_state(&config).await?;
    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it every queue handle) is gone.
    tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Tasks started by [`build_state`] that outlive a single request.
#[derive(Default)]
pub struct BackgroundTasks {
    drain: Option<JoinHandle<()>>,
    worker: Option<(CancellationToken, JoinHandle<Result<WorkerStats, StreamError>>)>,
}

impl BackgroundTasks {
    /// Whether stored logs are being published.
    #[must_use]
    pub fn is_publishing(&self) -> bool {
        self.drain.is_some()
    }

    /// Whether metrics are aggregated by a worker inside this process.
    #[must_use]
    pub fn has_embedded_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Flushes the publish backlog, then stops the embedded worker.
    ///
    /// Call this after every [`AppState`] clone is gone, or the backlog
    /// never finishes draining.
    pub async fn shutdown(self) {
        if let Some(drain) = self.drain {
            if let Err(e) = drain.await {
                tracing::warn!(error = %e, "Publish queue task failed");
            }
        }
        if let Some((cancel, worker)) = self.worker {
            cancel.cancel();
            match worker.await {
                Ok(Ok(stats)) => tracing::info!(
                    processed = stats.processed,
                    failed = stats.failed,
                    "Embedded worker stopped"
                ),
                Ok(Err(e)) => tracing::warn!(error = %e, "Embedded worker failed"),
                Err(e) => tracing::warn!(error = %e, "Embedded worker task failed"),
            }
        }
    }
}

/// Builds the application state from configuration.
///
/// With `DATABASE_URL`, metrics live in Postgres and are written by
/// `logscale-worker` processes reading the Redis stream; without
/// `REDIS_URL` stored logs are not published. Without `DATABASE_URL`,
/// metrics are kept in memory and fed by a worker running in this process
/// over an in-memory stream. An unconfigured log store falls back to memory.
///
/// # Errors
///
/// Returns an error if a configured backend cannot be reached or its schema
/// cannot be created.
pub async fn build_state(config: &Config) -> Result<(AppState, BackgroundTasks)> {
    let log_store: Arc<dyn LogStore> = if let Some(ch) = &config.clickhouse {
        let store = ClickHouseLogStore::new(db::Database::new(ch).client());
        store
            .ensure_schema()
            .await
            .context("Failed to prepare ClickHouse log table")?;
        tracing::info!(url = %ch.url, "Using ClickHouse log store");
        Arc::new(store)
    } else {
        tracing::info!("CLICKHOUSE_URL not set, using in-memory log store");
        Arc::new(InMemoryLogStore::new())
    };

    let pipeline = &config.pipeline;
    let mut tasks = BackgroundTasks::default();

    let Some(database_url) = &config.database_url else {
        if config.redis_url.is_some() {
            tracing::warn!("REDIS_URL is ignored while DATABASE_URL is unset");
        }
        let aggregator = MetricsAggregator::in_memory();
        let stream = Arc::new(InMemoryStream::new());

        let publisher = StreamPublisher::new(stream.clone(), &pipeline.stream_name);
        let (queue, drain) = PublishQueue::spawn(publisher, pipeline.publish_queue_capacity);

        let worker = Worker::new(stream, aggregator.clone(), pipeline.worker_config());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tracing::info!("DATABASE_URL not set, aggregating metrics in process");
        tasks.drain = Some(drain);
        tasks.worker = Some((cancel, handle));
        let state = AppState::new(log_store, aggregator).with_publish_queue(queue);
        return Ok((state, tasks));
    };

    let store = PostgresMetricsStore::new(db::connect_postgres(database_url).await?);
    store
        .migrate()
        .await
        .context("Failed to prepare service_metrics table")?;
    tracing::info!("Using Postgres metrics store");
    let mut state = AppState::new(log_store, MetricsAggregator::new(Arc::new(store)));

    if let Some(url) = &config.redis_url {
        let stream = RedisStream::connect(url)
            .await
            .context("Failed to connect to Redis")?;
        let publisher = StreamPublisher::new(Arc::new(stream), &pipeline.stream_name);
        let (queue, drain) = PublishQueue::spawn(publisher, pipeline.publish_queue_capacity);
        tracing::info!(
            stream = %pipeline.stream_name,
            capacity = pipeline.publish_queue_capacity,
            "Publishing stored logs"
        );
        state = state.with_publish_queue(queue);
        tasks.drain = Some(drain);
    } else {
        tracing::warn!("REDIS_URL not set, stored logs will not be published");
    }

    Ok((state, tasks))
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::root_routes())
        .merge(routes::health_routes(state.clone()))
        .merge(routes::logs_routes(state.clone()))
        .merge(routes::metrics_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint_returns_json() {
        let app = create_router(AppState::with_in_memory_store());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok());
        assert!(content_type.is_some_and(|ct| ct.contains("application/json")));
    }

    #[tokio::test]
    async fn test_build_state_without_backends_aggregates_in_process() {
        let (state, tasks) = build_state(&Config::default()).await.unwrap();

        assert!(tasks.is_publishing());
        assert!(tasks.has_embedded_worker());
        assert!(state.publish_queue().is_some());
        assert_eq!(state.log_store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_mode_serves_metrics_for_posted_logs() {
        let (state, tasks) = build_state(&Config::default()).await.unwrap();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/logs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"log":{"service":"auth","level":"error","message":"boom"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        let metrics = loop {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/v1/metrics/auth")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            if response.status() == StatusCode::OK {
                let body = response.into_body().collect().await.unwrap().to_bytes();
                break serde_json::from_slice::<serde_json::Value>(&body).unwrap();
            }
            assert!(tokio::time::Instant::now() < deadline, "metrics never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        };

        assert_eq!(metrics["total_logs"], 1);
        assert_eq!(metrics["error_count"], 1);
        assert_eq!(metrics["error_rate"], 1.0);

        drop(app);
        tasks.shutdown().await;
    }
}
