//! Display ordering of one sibling group.

use std::collections::HashSet;

use tasktree_model::TaskId;

/// Display order for the children of one node.
///
/// Children added since the last refresh come first (newest first), then
/// children updated since the last refresh, then everyone else in their
/// previous display order. Within that order succeeded children sink below
/// the rest, and only the first `limit` are visible.
#[derive(Debug, Clone, Default)]
pub struct ChildOrdering {
  sorted: Vec<TaskId>,
  added: Vec<TaskId>,
  updated: Vec<TaskId>,
  visible: Vec<TaskId>,
  dirty: bool,
}

impl ChildOrdering {
  /// Ordering seeded from a snapshot's children.
  pub fn from_initial(children: Vec<TaskId>) -> Self {
    Self {
      added: children,
      dirty: true,
      ..Self::default()
    }
  }

  pub fn add(&mut self, id: TaskId) {
    self.added.insert(0, id);
    self.dirty = true;
  }

  pub fn touch(&mut self, id: TaskId) {
    self.updated.push(id);
    self.dirty = true;
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Recompute the display order. `succeeded` tells whether a child has
  /// succeeded.
  pub fn refresh(&mut self, limit: usize, succeeded: impl Fn(&TaskId) -> bool) {
    if !self.dirty {
      return;
    }

    let mut visited = HashSet::new();
    let mut active = Vec::new();
    let mut inactive = Vec::new();
    let candidates = self
      .added
      .drain(..)
      .chain(self.updated.drain(..))
      .chain(self.sorted.drain(..));
    for id in candidates {
      if !visited.insert(id.clone()) {
        continue;
      }
      if succeeded(&id) {
        inactive.push(id);
      } else {
        active.push(id);
      }
    }

    active.extend(inactive);
    self.sorted = active;
    self.visible = self.sorted.iter().take(limit).cloned().collect();
    self.dirty = false;
  }

  /// The displayed children, at most `limit` of them.
  pub fn visible(&self) -> &[TaskId] {
    &self.visible
  }

  /// The full display order as of the last refresh.
  pub fn sorted(&self) -> &[TaskId] {
    &self.sorted
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(ids: &[&str]) -> Vec<TaskId> {
    ids.iter().map(|id| TaskId::from(*id)).collect()
  }

  #[test]
  fn test_new_then_updated_then_old() {
    let mut ordering = ChildOrdering::from_initial(ids(&["a", "b", "c"]));
    ordering.refresh(10, |_| false);
    assert_eq!(ordering.sorted(), ids(&["a", "b", "c"]).as_slice());

    ordering.touch(TaskId::from("c"));
    ordering.add(TaskId::from("d"));
    ordering.add(TaskId::from("e"));
    ordering.refresh(10, |_| false);

    assert_eq!(ordering.sorted(), ids(&["e", "d", "c", "a", "b"]).as_slice());
  }

  #[test]
  fn test_succeeded_sink_below_active() {
    let mut ordering = ChildOrdering::from_initial(ids(&["a", "b", "c"]));
    ordering.refresh(10, |id| id.as_str() == "a");
    assert_eq!(ordering.sorted(), ids(&["b", "c", "a"]).as_slice());
  }

  #[test]
  fn test_visible_window() {
    let children: Vec<TaskId> = (0..15).map(|i| TaskId::new(format!("t{i}"))).collect();
    let mut ordering = ChildOrdering::from_initial(children.clone());
    ordering.refresh(10, |_| false);

    assert_eq!(ordering.visible().len(), 10);
    assert_eq!(ordering.sorted().len(), 15);
    assert_eq!(ordering.visible(), &children[..10]);
  }

  #[test]
  fn test_refresh_is_noop_when_clean() {
    let mut ordering = ChildOrdering::from_initial(ids(&["a", "b"]));
    ordering.refresh(10, |_| false);
    assert!(!ordering.is_dirty());

    // Not dirty, so a changed predicate has no effect until the next change
    ordering.refresh(10, |_| true);
    assert_eq!(ordering.sorted(), ids(&["a", "b"]).as_slice());
  }
}
