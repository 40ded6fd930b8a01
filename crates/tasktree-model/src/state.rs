use serde::{Deserialize, Serialize};

/// Lifecycle state of a task node.
///
/// `Succeeded`, `Failed` and `Cancelled` are terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
  #[default]
  Pending,
  Running,
  Paused,
  Succeeded,
  Failed,
  Cancelled,
}

impl TaskState {
  /// Whether no further transition can leave this state.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
    )
  }

  /// Whether the node is still doing (or waiting to do) work.
  pub fn is_active(self) -> bool {
    !self.is_terminal()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_states() {
    assert!(!TaskState::Pending.is_terminal());
    assert!(!TaskState::Running.is_terminal());
    assert!(!TaskState::Paused.is_terminal());
    assert!(TaskState::Succeeded.is_terminal());
    assert!(TaskState::Failed.is_terminal());
    assert!(TaskState::Cancelled.is_terminal());
  }

  #[test]
  fn test_state_serializes_snake_case() {
    let json = serde_json::to_string(&TaskState::Cancelled).unwrap();
    assert_eq!(json, "\"cancelled\"");
  }
}
