use serde::{Deserialize, Serialize};

use crate::id::TaskId;

/// A control command sent from a subscriber to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  Pause,
  Resume,
  Cancel,
}

/// `task-operation` request payload: `{ "type": "pause", "id": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOperation {
  #[serde(rename = "type")]
  pub kind: OperationKind,
  pub id: TaskId,
}

impl TaskOperation {
  pub fn new(kind: OperationKind, id: impl Into<TaskId>) -> Self {
    Self {
      kind,
      id: id.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_operation() {
    let op: TaskOperation = serde_json::from_str(r#"{"type":"cancel","id":"t-1"}"#).unwrap();
    assert_eq!(op, TaskOperation::new(OperationKind::Cancel, "t-1"));
  }
}
