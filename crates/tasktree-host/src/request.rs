//! Wire shapes of the host operations.

use serde::{Deserialize, Serialize};
use tasktree_model::{TaskNode, TaskOperation};

/// A client request, tagged by operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "kebab-case")]
pub enum HostRequest {
  Subscribe,
  Unsubscribe,
  TaskOperation(TaskOperation),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostResponse {
  Snapshot(Vec<TaskNode>),
  Done(bool),
}

#[cfg(test)]
mod tests {
  use super::*;
  use tasktree_model::OperationKind;

  #[test]
  fn test_request_wire_format() {
    let request: HostRequest = serde_json::from_str(
      r#"{"op": "task-operation", "payload": {"type": "cancel", "id": "abc"}}"#,
    )
    .unwrap();
    assert_eq!(
      request,
      HostRequest::TaskOperation(TaskOperation::new(OperationKind::Cancel, "abc"))
    );

    let request: HostRequest = serde_json::from_str(r#"{"op": "subscribe"}"#).unwrap();
    assert_eq!(request, HostRequest::Subscribe);
  }
}
