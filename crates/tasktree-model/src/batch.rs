use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::state::TaskState;

/// A node that started during the flush window. Emitted once per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAdded {
  pub id: TaskId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<TaskId>,
  pub name: String,
  #[serde(default)]
  pub param: serde_json::Value,
  pub time: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to: Option<String>,
}

/// Coalesced changes to one node during a flush window.
///
/// Every field except `id` and `time` is optional; absent means "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
  pub id: TaskId,
  pub time: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<TaskState>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Units transferred since the previous flush, summed across the window.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chunk_size: Option<u64>,
}

impl TaskUpdate {
  /// An update that carries nothing but the id and timestamp.
  pub fn empty(id: TaskId, time: DateTime<Utc>) -> Self {
    Self {
      id,
      time,
      progress: None,
      total: None,
      message: None,
      from: None,
      to: None,
      state: None,
      error: None,
      chunk_size: None,
    }
  }
}

/// One transport payload: `{ adds, updates }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
  pub adds: Vec<TaskAdded>,
  pub updates: Vec<TaskUpdate>,
}

impl Batch {
  pub fn is_empty(&self) -> bool {
    self.adds.is_empty() && self.updates.is_empty()
  }

  /// Number of records in the batch (adds plus updates).
  pub fn len(&self) -> usize {
    self.adds.len() + self.updates.len()
  }
}
