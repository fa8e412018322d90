//! Logging initialization using tracing.

use std::io;

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::LoggingConfig;

/// Initialized logger. Holds the appender guard so buffered file output is
/// flushed on drop.
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

impl Logger {
    /// Initialize the global subscriber from the given configuration.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let mut layers: Vec<BoxedLayer> = vec![stdout_layer(config)?];

        let guard = if let Some(log_dir) = &config.log_dir {
            let file_appender = rolling::daily(log_dir, "labsup.log");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            // File output is always JSON for structured consumption.
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_filter(env_filter(config)?)
                    .boxed(),
            );
            Some(guard)
        } else {
            None
        };

        tracing_subscriber::registry().with(layers).init();
        Ok(Self { _guard: guard })
    }
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let default_level = parse_log_level(&config.level)?;
    Ok(EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy())
}

fn stdout_layer(config: &LoggingConfig) -> Result<BoxedLayer> {
    let layer: BoxedLayer = match config.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter(config)?)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter(config)?)
            .boxed(),
        other => return Err(anyhow!("unknown log format: {other}")),
    };
    Ok(layer)
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!("unknown log level: {other}")),
    }
}
