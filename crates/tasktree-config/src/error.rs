//! Config errors.

use std::path::PathBuf;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The config file could not be read.
  #[error("failed to read config file '{}'", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The config is not valid JSON or has the wrong shape.
  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),

  /// A value is out of range.
  #[error("invalid config value for '{field}': {message}")]
  Invalid {
    field: &'static str,
    message: String,
  },
}
