//! Configuration module for LogScale.
//!
//! This module contains the pipeline settings shared by the API server and
//! the worker.

pub mod pipeline;

pub use pipeline::{ConfigError, PipelineConfig, DEFAULT_STREAM_NAME};
