//! The local task forest.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasktree_config::MirrorConfig;
use tasktree_model::{Batch, TaskAdded, TaskId, TaskNode, TaskState, TaskUpdate};
use tracing::{debug, warn};

use crate::ordering::ChildOrdering;

/// One node as the subscriber sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorNode {
  pub id: TaskId,
  pub parent_id: Option<TaskId>,
  pub name: String,
  pub param: serde_json::Value,
  pub state: TaskState,
  pub progress: u64,
  pub total: Option<u64>,
  /// Display line: the latest error, endpoint or status message.
  pub message: String,
  pub from: Option<String>,
  pub to: Option<String>,
  pub error: Option<String>,
  /// Units transferred, summed over every received `chunk_size`.
  pub throughput: u64,
  pub time: DateTime<Utc>,
  /// Children in spawn order.
  pub children: Vec<TaskId>,
}

impl MirrorNode {
  fn from_added(add: &TaskAdded) -> Self {
    Self {
      id: add.id.clone(),
      parent_id: add.parent_id.clone(),
      name: add.name.clone(),
      param: add.param.clone(),
      state: TaskState::Running,
      progress: 0,
      total: None,
      message: pick_message([add.from.as_deref(), add.to.as_deref()]).unwrap_or_default(),
      from: add.from.clone(),
      to: add.to.clone(),
      error: None,
      throughput: 0,
      time: add.time,
      children: Vec::new(),
    }
  }

  fn from_snapshot(node: &TaskNode) -> Self {
    Self {
      id: node.id.clone(),
      parent_id: node.parent_id.clone(),
      name: node.name.clone(),
      param: node.param.clone(),
      state: node.state,
      progress: node.progress,
      total: node.total,
      message: pick_message([
        node.error.as_deref(),
        node.from.as_deref(),
        node.to.as_deref(),
        node.message.as_deref(),
      ])
      .unwrap_or_default(),
      from: node.from.clone(),
      to: node.to.clone(),
      error: node.error.clone(),
      throughput: 0,
      time: node.time,
      children: node.children.iter().map(|c| c.id.clone()).collect(),
    }
  }

  fn apply(&mut self, update: &TaskUpdate) {
    if let Some(state) = update.state {
      self.state = state;
    }
    if let Some(progress) = update.progress {
      self.progress = progress;
    }
    if update.total.is_some() {
      self.total = update.total;
    }
    if update.from.is_some() {
      self.from = update.from.clone();
    }
    if update.to.is_some() {
      self.to = update.to.clone();
    }
    if update.error.is_some() {
      self.error = update.error.clone();
    }
    self.time = update.time;
    if let Some(message) = pick_message([
      update.error.as_deref(),
      update.from.as_deref(),
      update.to.as_deref(),
      update.message.as_deref(),
    ]) {
      self.message = message;
    }
    if let Some(chunk) = update.chunk_size {
      self.throughput = self.throughput.saturating_add(chunk);
    }
  }
}

fn pick_message<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
  candidates
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

/// What one batch did to the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
  pub adds_applied: usize,
  /// Duplicate ids.
  pub adds_skipped: usize,
  pub updates_applied: usize,
  /// Updates for ids the mirror has never seen.
  pub updates_dropped: usize,
}

/// Serializable nested view of the displayed forest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorView {
  pub id: TaskId,
  pub name: String,
  pub state: TaskState,
  pub progress: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total: Option<u64>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub message: String,
  pub throughput: u64,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<MirrorView>,
}

/// Local copy of the task forest.
#[derive(Debug, Clone)]
pub struct Mirror {
  nodes: HashMap<TaskId, MirrorNode>,
  /// Root ids, newest first.
  roots: Vec<TaskId>,
  orderings: HashMap<TaskId, ChildOrdering>,
  visible_children: usize,
}

impl Default for Mirror {
  fn default() -> Self {
    Self::new(&MirrorConfig::default())
  }
}

impl Mirror {
  pub fn new(config: &MirrorConfig) -> Self {
    Self {
      nodes: HashMap::new(),
      roots: Vec::new(),
      orderings: HashMap::new(),
      visible_children: config.visible_children,
    }
  }

  /// Replace everything with a snapshot forest given in submission order.
  pub fn apply_snapshot(&mut self, forest: &[TaskNode]) {
    self.nodes.clear();
    self.orderings.clear();
    self.roots.clear();

    for root in forest.iter().rev() {
      self.roots.push(root.id.clone());
      self.record_snapshot(root);
    }
    self.refresh();
    debug!(roots = self.roots.len(), nodes = self.nodes.len(), "snapshot_applied");
  }

  fn record_snapshot(&mut self, node: &TaskNode) {
    let mirrored = MirrorNode::from_snapshot(node);
    self.orderings.insert(
      node.id.clone(),
      ChildOrdering::from_initial(mirrored.children.clone()),
    );
    self.nodes.insert(node.id.clone(), mirrored);
    for child in &node.children {
      self.record_snapshot(child);
    }
  }

  /// Merge one batch: adds first, then updates.
  pub fn apply_batch(&mut self, batch: &Batch) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    for add in &batch.adds {
      if self.add(add) {
        outcome.adds_applied += 1;
      } else {
        outcome.adds_skipped += 1;
      }
    }
    for update in &batch.updates {
      if self.update(update) {
        outcome.updates_applied += 1;
      } else {
        outcome.updates_dropped += 1;
      }
    }

    self.refresh();
    outcome
  }

  fn add(&mut self, add: &TaskAdded) -> bool {
    if self.nodes.contains_key(&add.id) {
      warn!(task_id = %add.id, name = %add.name, "skip duplicated task");
      return false;
    }

    match &add.parent_id {
      Some(parent_id) => match self.nodes.get_mut(parent_id) {
        Some(parent) => {
          parent.children.push(add.id.clone());
          self
            .orderings
            .entry(parent_id.clone())
            .or_default()
            .add(add.id.clone());
        }
        None => {
          warn!(task_id = %add.id, parent_id = %parent_id, "parent not found, task recorded detached");
        }
      },
      None => self.roots.insert(0, add.id.clone()),
    }

    self.orderings.insert(add.id.clone(), ChildOrdering::default());
    self.nodes.insert(add.id.clone(), MirrorNode::from_added(add));
    true
  }

  fn update(&mut self, update: &TaskUpdate) -> bool {
    let Some(node) = self.nodes.get_mut(&update.id) else {
      debug!(task_id = %update.id, "cannot apply update for task as task not found");
      return false;
    };
    node.apply(update);

    if let Some(parent_id) = node.parent_id.clone() {
      if let Some(ordering) = self.orderings.get_mut(&parent_id) {
        ordering.touch(update.id.clone());
      }
    }
    true
  }

  fn refresh(&mut self) {
    let nodes = &self.nodes;
    let limit = self.visible_children;
    for ordering in self.orderings.values_mut() {
      ordering.refresh(limit, |id| {
        nodes
          .get(id)
          .is_some_and(|node| node.state == TaskState::Succeeded)
      });
    }
  }

  pub fn get(&self, id: &TaskId) -> Option<&MirrorNode> {
    self.nodes.get(id)
  }

  /// Root nodes, newest first.
  pub fn roots(&self) -> impl Iterator<Item = &MirrorNode> {
    self.roots.iter().filter_map(|id| self.nodes.get(id))
  }

  /// The displayed children of `id`, in display order.
  pub fn visible_children(&self, id: &TaskId) -> Vec<&MirrorNode> {
    self
      .orderings
      .get(id)
      .map(|ordering| {
        ordering
          .visible()
          .iter()
          .filter_map(|child| self.nodes.get(child))
          .collect()
      })
      .unwrap_or_default()
  }

  /// Number of nodes known to the mirror, detached ones included.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// The displayed forest: roots newest first, children in display order.
  pub fn view(&self) -> Vec<MirrorView> {
    self.roots().map(|root| self.view_of(root)).collect()
  }

  fn view_of(&self, node: &MirrorNode) -> MirrorView {
    MirrorView {
      id: node.id.clone(),
      name: node.name.clone(),
      state: node.state,
      progress: node.progress,
      total: node.total,
      message: node.message.clone(),
      throughput: node.throughput,
      children: self
        .visible_children(&node.id)
        .into_iter()
        .map(|child| self.view_of(child))
        .collect(),
    }
  }
}
