//! Tasktree Config
//!
//! Serializable configuration for the task sync pipeline. Every field has a
//! default, so an empty JSON object (or no file at all) is a valid config.
//!
//! ```json
//! {
//!   "sync":   { "interval_ms": 500, "threshold": 30 },
//!   "mirror": { "visible_children": 10 },
//!   "log":    { "level": "info", "format": "compact" }
//! }
//! ```

mod error;
mod log;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::ConfigError;
pub use log::{LogConfig, LogFormat};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub sync: SyncConfig,
  pub mirror: MirrorConfig,
  pub log: LogConfig,
}

/// When the host pushes accumulated task changes to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Periodic flush cadence in milliseconds.
  pub interval_ms: u64,
  /// Pending record count above which a flush is forced immediately.
  pub threshold: usize,
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_ms: 500,
      threshold: 30,
    }
  }
}

/// Presentation settings for the subscriber-side mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
  /// How many children of one parent are displayed at once.
  pub visible_children: usize,
}

impl Default for MirrorConfig {
  fn default() -> Self {
    Self {
      visible_children: 10,
    }
  }
}

impl Config {
  /// Parse and validate a JSON config.
  pub fn from_json(input: &str) -> Result<Self, ConfigError> {
    let config: Config = serde_json::from_str(input)?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a JSON config file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Reject values the pipeline cannot run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.sync.interval_ms == 0 {
      return Err(ConfigError::Invalid {
        field: "sync.interval_ms",
        message: "must be greater than zero".to_string(),
      });
    }
    if self.mirror.visible_children == 0 {
      return Err(ConfigError::Invalid {
        field: "mirror.visible_children",
        message: "must be greater than zero".to_string(),
      });
    }
    Ok(())
  }
}
