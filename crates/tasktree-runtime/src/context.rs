//! The handle a task body uses to talk to the runtime.

use std::sync::Arc;

use tasktree_model::TaskId;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::node::{ProgressPatch, TaskCell};
use crate::session::Session;
use crate::task::{Submittable, TaskHandle};

/// Context handed to every task body.
///
/// Progress reports made after the node settles are ignored.
#[derive(Clone)]
pub struct TaskContext {
  cell: Arc<TaskCell>,
  session: Session,
}

impl TaskContext {
  pub(crate) fn new(cell: Arc<TaskCell>, session: Session) -> Self {
    Self { cell, session }
  }

  pub fn id(&self) -> &TaskId {
    &self.cell.id
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  /// Report absolute progress, optionally with a new total and status line.
  pub fn update(&self, progress: u64, total: Option<u64>, message: Option<&str>) {
    self.cell.update(ProgressPatch {
      progress: Some(progress),
      total,
      message: message.map(str::to_string),
      ..Default::default()
    });
  }

  /// Report `chunk` more units done. The chunk is forwarded as `chunk_size`.
  pub fn advance(&self, chunk: u64) {
    self.cell.update(ProgressPatch {
      advance: Some(chunk),
      ..Default::default()
    });
  }

  pub fn set_total(&self, total: u64) {
    self.cell.update(ProgressPatch {
      total: Some(total),
      ..Default::default()
    });
  }

  pub fn set_message(&self, message: impl Into<String>) {
    self.cell.update(ProgressPatch {
      message: Some(message.into()),
      ..Default::default()
    });
  }

  pub fn set_from(&self, from: impl Into<String>) {
    self.cell.update(ProgressPatch {
      from: Some(from.into()),
      ..Default::default()
    });
  }

  pub fn set_to(&self, to: impl Into<String>) {
    self.cell.update(ProgressPatch {
      to: Some(to.into()),
      ..Default::default()
    });
  }

  /// Pause this node and its running children.
  pub fn pause(&self) -> bool {
    self.cell.pause()
  }

  pub fn resume(&self) -> bool {
    self.cell.resume()
  }

  /// Request cancellation of this node and its subtree.
  pub fn cancel(&self) -> bool {
    self.cell.request_cancel()
  }

  /// Spawn a child task under this node.
  ///
  /// The child inherits this node's cancellation, and this node will not
  /// settle until the child has.
  pub fn execute<C: Submittable>(&self, child: C) -> TaskHandle<C::Output> {
    self.session.spawn_child(&self.cell, child)
  }

  pub fn is_cancelled(&self) -> bool {
    self.cell.cancel.is_cancelled()
  }

  /// Resolves once cancellation of this node has been requested.
  pub async fn cancelled(&self) {
    self.cell.cancel.cancelled().await
  }

  /// A token that is cancelled together with this node.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cell.cancel.clone()
  }

  /// Cooperative pause and cancellation point.
  ///
  /// Returns immediately while running, waits while paused, and returns
  /// `Err(TaskError::Cancelled)` once cancellation has been requested.
  pub async fn checkpoint(&self) -> Result<(), TaskError> {
    let mut paused = self.cell.subscribe_paused();
    loop {
      if self.cell.cancel.is_cancelled() {
        return Err(TaskError::Cancelled);
      }
      if !*paused.borrow_and_update() {
        return Ok(());
      }

      tokio::select! {
        _ = self.cell.cancel.cancelled() => return Err(TaskError::Cancelled),
        changed = paused.changed() => {
          if changed.is_err() {
            return Ok(());
          }
        }
      }
    }
  }
}
