//! Snapshot gating in front of the mirror.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tasktree_config::MirrorConfig;
use tasktree_model::{Batch, TaskNode};
use tracing::debug;

use crate::mirror::{ApplyOutcome, Mirror};

struct State {
  mirror: Mirror,
  /// Batches received before the snapshot. `None` once synced.
  backlog: Option<VecDeque<Batch>>,
}

/// Applies batches to a [`Mirror`], holding them back until the initial
/// snapshot is in.
pub struct Reconciler {
  state: Mutex<State>,
}

impl Reconciler {
  /// A reconciler waiting for its snapshot.
  pub fn new(config: &MirrorConfig) -> Self {
    Self {
      state: Mutex::new(State {
        mirror: Mirror::new(config),
        backlog: Some(VecDeque::new()),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Apply a batch, or queue it if the snapshot has not arrived yet.
  ///
  /// Returns `None` when the batch was queued.
  pub fn handle_batch(&self, batch: Batch) -> Option<ApplyOutcome> {
    let mut state = self.lock();
    if let Some(backlog) = state.backlog.as_mut() {
      backlog.push_back(batch);
      debug!(queued = backlog.len(), "batch_queued_until_synced");
      return None;
    }
    Some(state.mirror.apply_batch(&batch))
  }

  /// Rebuild the mirror from a snapshot, then replay queued batches in
  /// arrival order and open the gate.
  pub fn apply_snapshot(&self, forest: &[TaskNode]) {
    let mut state = self.lock();
    state.mirror.apply_snapshot(forest);
    let backlog = state.backlog.take().unwrap_or_default();
    let replayed = backlog.len();
    for batch in backlog {
      state.mirror.apply_batch(&batch);
    }
    debug!(replayed, "mirror_synced");
  }

  pub fn is_synced(&self) -> bool {
    self.lock().backlog.is_none()
  }

  /// Read the mirror under the reconciler's lock.
  pub fn read<R>(&self, f: impl FnOnce(&Mirror) -> R) -> R {
    f(&self.lock().mirror)
  }
}
