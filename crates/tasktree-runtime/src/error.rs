//! Task errors.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a task body can resolve with, and what `TaskHandle::wait` returns.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// The task observed its cancellation and stopped.
  #[error("task cancelled")]
  Cancelled,

  /// The task failed with an error.
  #[error("{message}")]
  Failed {
    message: String,
    #[source]
    source: Option<BoxError>,
  },

  /// The task failed with an arbitrary value instead of an error.
  #[error("{}", render_pretty(.0))]
  Thrown(serde_json::Value),

  /// The task body panicked.
  #[error("task panicked: {0}")]
  Panicked(String),
}

impl TaskError {
  /// Wrap any error as a task failure.
  pub fn failed(error: impl Into<BoxError>) -> Self {
    let source = error.into();
    Self::Failed {
      message: source.to_string(),
      source: Some(source),
    }
  }

  /// A failure with just a message.
  pub fn msg(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
      source: None,
    }
  }

  /// A failure carrying a non-error value.
  pub fn thrown(value: impl Into<serde_json::Value>) -> Self {
    Self::Thrown(value.into())
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, TaskError::Cancelled)
  }

  /// The string recorded in the failed node's `error` field.
  ///
  /// Errors render through `Display`; thrown values render as JSON indented
  /// with four spaces.
  pub fn normalize(&self) -> String {
    self.to_string()
  }
}

impl From<std::io::Error> for TaskError {
  fn from(error: std::io::Error) -> Self {
    Self::failed(error)
  }
}

fn render_pretty(value: &serde_json::Value) -> String {
  let mut buf = Vec::new();
  let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
  match value.serialize(&mut serializer) {
    Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
    Err(_) => value.to_string(),
  }
}
