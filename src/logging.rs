//! Logging initialization.
//!
//! `TASKTREE_LOG` overrides the configured level with a full filter
//! directive, e.g. `TASKTREE_LOG=tasktree=debug,tasktree_sync=trace`.

use tasktree_config::{LogConfig, LogFormat};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging(config: &LogConfig) {
  let env_filter = EnvFilter::try_from_env("TASKTREE_LOG")
    .unwrap_or_else(|_| EnvFilter::new(format!("tasktree={}", config.level.to_lowercase())));

  // stdout carries the demo output, logs go to stderr
  let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
  let layer = match config.format {
    LogFormat::Pretty => layer.pretty().boxed(),
    LogFormat::Compact => layer.compact().boxed(),
    LogFormat::Json => layer.json().boxed(),
  };

  tracing_subscriber::registry()
    .with(env_filter)
    .with(layer)
    .init();

  tracing::debug!(level = %config.level, format = ?config.format, "logging_initialized");
}
