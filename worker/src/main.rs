//! LogScale Worker
//!
//! Consumes log events from the stream as a member of a consumer group and
//! keeps per-service metrics up to date in Postgres.
//!
//! # Usage
//!
//! ```bash
//! logscale-worker --help
//! logscale-worker run --consumer worker-2
//! logscale-worker info
//! ```
//!
//! Settings not given on the command line are read from the environment
//! (`STREAM_NAME`, `CONSUMER_GROUP`, `CONSUMER_NAME`, `WORKER_BATCH_SIZE`,
//! `WORKER_BLOCK_MS`, `WORKER_RETRY_DELAY_MS`, `DEAD_LETTER_STREAM`).

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::config::PipelineConfig;
use shared::pipeline::{MetricsAggregator, Worker, WorkerConfig};
use shared::storage::PostgresMetricsStore;
use shared::stream::{EventStream, RedisStream};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// LogScale worker - turns log events into service metrics
#[derive(Parser)]
#[command(name = "logscale-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Stream to consume (overrides STREAM_NAME)
    #[arg(short, long)]
    stream: Option<String>,

    /// Consumer group (overrides CONSUMER_GROUP)
    #[arg(short, long)]
    group: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume events until interrupted (default)
    Run(RunArgs),
    /// Print stream and consumer group state as JSON
    Info,
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Postgres connection URL for the metrics table
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Consumer name within the group (overrides CONSUMER_NAME)
    #[arg(short, long)]
    consumer: Option<String>,

    /// Entries per read (overrides WORKER_BATCH_SIZE)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Stream receiving unprocessable entries (overrides DEAD_LETTER_STREAM)
    #[arg(long)]
    dead_letter_stream: Option<String>,
}

impl Cli {
    /// Applies command-line overrides to the environment configuration.
    fn worker_config(&self, pipeline: &PipelineConfig) -> WorkerConfig {
        let mut config = pipeline.worker_config();
        if let Some(stream) = &self.stream {
            config = config.with_stream(stream.as_str());
        }
        if let Some(group) = &self.group {
            config = config.with_group(group.as_str());
        }
        if let Some(Commands::Run(args)) = &self.command {
            if let Some(consumer) = &args.consumer {
                config = config.with_consumer(consumer.as_str());
            }
            if let Some(batch_size) = args.batch_size {
                config = config.with_batch_size(batch_size);
            }
            if let Some(dead_letter) = &args.dead_letter_stream {
                config = config.with_dead_letter_stream(dead_letter.as_str());
            }
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let pipeline = PipelineConfig::from_env()?;
    let config = cli.worker_config(&pipeline);

    let stream = RedisStream::connect(&cli.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    match cli.command {
        Some(Commands::Info) => info(&stream, &config).await,
        Some(Commands::Run(args)) => run(stream, &args, config).await,
        None => run(stream, &RunArgs::default(), config).await,
    }
}

async fn info(stream: &RedisStream, config: &WorkerConfig) -> Result<()> {
    let info = stream.info(&config.stream).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run(stream: RedisStream, args: &RunArgs, config: WorkerConfig) -> Result<()> {
    // Without a subcommand clap never read DATABASE_URL.
    let database_url = args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("DATABASE_URL is required to run the worker")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = PostgresMetricsStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to prepare service_metrics table")?;

    tracing::info!(
        stream = %config.stream,
        group = %config.group,
        consumer = %config.consumer,
        batch_size = config.batch_size,
        dead_letter = config.dead_letter_stream.as_deref().unwrap_or("disabled"),
        "LogScale worker starting"
    );

    let worker = Worker::new(
        Arc::new(stream),
        MetricsAggregator::new(Arc::new(store)),
        config,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let stats = worker.run(cancel).await?;
    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        acknowledged = stats.acknowledged,
        dead_lettered = stats.dead_lettered,
        read_errors = stats.read_errors,
        "Worker shutdown complete"
    );
    Ok(())
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
            tracing::info!("Received Ctrl+C, finishing current batch");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing current batch");
        }
    }
}
