use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque task identifier, unique within a session.
///
/// This is the join key used by every consumer of the task stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for TaskId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

impl From<&str> for TaskId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}
