use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::state::TaskState;

/// Snapshot of one task and its subtree.
///
/// This is what a subscriber receives for the initial full sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
  pub id: TaskId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<TaskId>,
  /// Display key, usually a localization path such as `install.version`.
  pub name: String,
  /// Parameters for the display key.
  #[serde(default)]
  pub param: serde_json::Value,
  pub state: TaskState,
  pub progress: u64,
  /// `None` while the total amount of work is unknown.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  /// Normalized failure reason, only set when `state` is `Failed`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to: Option<String>,
  pub time: DateTime<Utc>,
  /// Children in spawn order.
  #[serde(default)]
  pub children: Vec<TaskNode>,
}

impl TaskNode {
  /// Depth-first search for a node by id in this subtree.
  pub fn find(&self, id: &TaskId) -> Option<&TaskNode> {
    if &self.id == id {
      return Some(self);
    }
    self.children.iter().find_map(|c| c.find(id))
  }

  /// Number of nodes in this subtree, including this one.
  pub fn size(&self) -> usize {
    1 + self.children.iter().map(TaskNode::size).sum::<usize>()
  }
}
