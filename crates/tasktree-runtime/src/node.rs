//! Live task node state.
//!
//! A [`TaskCell`] is the runtime's record of one node. All mutation goes
//! through its transition methods, which emit the matching event while the
//! node is still locked so per-node event order matches transition order.

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tasktree_model::{TaskId, TaskNode, TaskState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::events::{EventBus, TaskEvent, TaskEventKind};
use crate::sync::lock;

/// Static description of a task, taken from its `Submittable` at spawn time.
pub(crate) struct TaskMeta {
  pub(crate) name: String,
  pub(crate) param: serde_json::Value,
  pub(crate) from: Option<String>,
  pub(crate) to: Option<String>,
}

/// A progress report from a task body. Unset fields are left unchanged.
#[derive(Debug, Default)]
pub(crate) struct ProgressPatch {
  pub(crate) progress: Option<u64>,
  pub(crate) advance: Option<u64>,
  pub(crate) total: Option<u64>,
  pub(crate) message: Option<String>,
  pub(crate) from: Option<String>,
  pub(crate) to: Option<String>,
}

/// How a task body ended, after children settled.
pub(crate) enum Settlement {
  Succeeded,
  Failed(String),
  Cancelled,
}

struct NodeInner {
  state: TaskState,
  progress: u64,
  total: Option<u64>,
  message: Option<String>,
  error: Option<String>,
  from: Option<String>,
  to: Option<String>,
  time: DateTime<Utc>,
  children: Vec<Arc<TaskCell>>,
  /// Set once the body has returned and the node waits on its children.
  /// No new children are accepted from then on.
  sealed: bool,
}

pub(crate) struct TaskCell {
  pub(crate) id: TaskId,
  pub(crate) parent_id: Option<TaskId>,
  pub(crate) root_id: TaskId,
  pub(crate) name: String,
  param: serde_json::Value,
  pub(crate) cancel: CancellationToken,
  paused: watch::Sender<bool>,
  /// The parent's pause flag, read when this node starts.
  parent_paused: Option<watch::Receiver<bool>>,
  /// Tracks spawned children so the node can wait for them to settle.
  pub(crate) children: TaskTracker,
  inner: Mutex<NodeInner>,
  bus: Arc<EventBus>,
}

impl TaskCell {
  pub(crate) fn new(
    id: TaskId,
    parent_id: Option<TaskId>,
    root_id: TaskId,
    meta: TaskMeta,
    cancel: CancellationToken,
    parent_paused: Option<watch::Receiver<bool>>,
    bus: Arc<EventBus>,
  ) -> Self {
    let (paused, _) = watch::channel(false);
    Self {
      id,
      parent_id,
      root_id,
      name: meta.name,
      param: meta.param,
      cancel,
      paused,
      parent_paused,
      children: TaskTracker::new(),
      inner: Mutex::new(NodeInner {
        state: TaskState::Pending,
        progress: 0,
        total: None,
        message: None,
        error: None,
        from: meta.from,
        to: meta.to,
        time: Utc::now(),
        children: Vec::new(),
        sealed: false,
      }),
      bus,
    }
  }

  pub(crate) fn state(&self) -> TaskState {
    lock(&self.inner).state
  }

  pub(crate) fn subscribe_paused(&self) -> watch::Receiver<bool> {
    self.paused.subscribe()
  }

  fn emit(&self, time: DateTime<Utc>, kind: TaskEventKind) {
    self.bus.emit(TaskEvent {
      id: self.id.clone(),
      time,
      kind,
    });
  }

  /// `Pending -> Running`, or straight on to `Paused` when the parent is
  /// paused at that moment.
  pub(crate) fn start(&self) -> bool {
    let mut inner = lock(&self.inner);
    if inner.state != TaskState::Pending {
      return false;
    }
    inner.state = TaskState::Running;
    inner.time = Utc::now();

    // Read under this node's lock: a parent pause either lands before this
    // read or finds the node running and pauses it
    let parent_paused = self
      .parent_paused
      .as_ref()
      .is_some_and(|paused| *paused.borrow());

    info!(
      task_id = %self.id,
      parent_id = ?self.parent_id,
      name = %self.name,
      "task_started"
    );
    self.emit(
      inner.time,
      TaskEventKind::Started {
        parent_id: self.parent_id.clone(),
        name: self.name.clone(),
        param: self.param.clone(),
        from: inner.from.clone(),
        to: inner.to.clone(),
      },
    );

    if parent_paused {
      inner.state = TaskState::Paused;
      self.paused.send_replace(true);
      debug!(task_id = %self.id, "task_paused");
      self.emit(inner.time, TaskEventKind::Paused);
    }
    true
  }

  /// Apply a progress report. Ignored once the node is terminal.
  pub(crate) fn update(&self, patch: ProgressPatch) -> bool {
    let mut inner = lock(&self.inner);
    if inner.state.is_terminal() {
      return false;
    }

    if let Some(total) = patch.total {
      inner.total = Some(total);
    }
    if let Some(progress) = patch.progress {
      inner.progress = progress;
    }
    if let Some(chunk) = patch.advance {
      inner.progress = inner.progress.saturating_add(chunk);
    }
    if let Some(total) = inner.total {
      inner.progress = inner.progress.min(total);
    }
    if patch.message.is_some() {
      inner.message = patch.message.clone();
    }
    if patch.from.is_some() {
      inner.from = patch.from;
    }
    if patch.to.is_some() {
      inner.to = patch.to;
    }
    inner.time = Utc::now();

    self.emit(
      inner.time,
      TaskEventKind::Updated {
        progress: inner.progress,
        total: inner.total,
        message: patch.message,
        from: inner.from.clone(),
        to: inner.to.clone(),
        chunk_size: patch.advance,
      },
    );
    true
  }

  /// `Running -> Paused`, then pause every child.
  pub(crate) fn pause(&self) -> bool {
    let children = {
      let mut inner = lock(&self.inner);
      if inner.state != TaskState::Running {
        return false;
      }
      inner.state = TaskState::Paused;
      inner.time = Utc::now();
      self.paused.send_replace(true);

      debug!(task_id = %self.id, "task_paused");
      self.emit(inner.time, TaskEventKind::Paused);
      inner.children.clone()
    };

    for child in children {
      child.pause();
    }
    true
  }

  /// `Paused -> Running`, then resume every child.
  pub(crate) fn resume(&self) -> bool {
    let children = {
      let mut inner = lock(&self.inner);
      if inner.state != TaskState::Paused {
        return false;
      }
      inner.state = TaskState::Running;
      inner.time = Utc::now();
      self.paused.send_replace(false);

      debug!(task_id = %self.id, "task_resumed");
      self.emit(inner.time, TaskEventKind::Resumed);
      inner.children.clone()
    };

    for child in children {
      child.resume();
    }
    true
  }

  /// Request cooperative cancellation of this node and its subtree.
  ///
  /// The node only becomes `Cancelled` once its body and children settle.
  pub(crate) fn request_cancel(&self) -> bool {
    if self.state().is_terminal() || self.cancel.is_cancelled() {
      return false;
    }
    debug!(task_id = %self.id, "task_cancel_requested");
    self.cancel.cancel();
    true
  }

  /// Enter a terminal state. A node that is already terminal stays as it is.
  pub(crate) fn settle(&self, settlement: Settlement) -> bool {
    let mut inner = lock(&self.inner);
    if inner.state.is_terminal() {
      return false;
    }
    inner.time = Utc::now();
    let kind = match settlement {
      Settlement::Succeeded => {
        inner.state = TaskState::Succeeded;
        TaskEventKind::Succeeded
      }
      Settlement::Failed(error) => {
        inner.state = TaskState::Failed;
        inner.error = Some(error.clone());
        TaskEventKind::Failed { error }
      }
      Settlement::Cancelled => {
        inner.state = TaskState::Cancelled;
        TaskEventKind::Cancelled
      }
    };
    // Wake anything parked on the pause flag
    self.paused.send_replace(false);
    self.emit(inner.time, kind);
    true
  }

  /// Stop accepting children. Called once the body has returned, before
  /// waiting on the children already spawned.
  pub(crate) fn seal(&self) {
    lock(&self.inner).sealed = true;
    self.children.close();
  }

  /// Attach a freshly created child and spawn its driver on this node's
  /// tracker. Refused once this node is sealed.
  ///
  /// Both happen under the node lock, so `seal` either refuses the child or
  /// finds it already tracked.
  pub(crate) fn spawn_child<F>(&self, child: Arc<TaskCell>, driver: F) -> Option<JoinHandle<F::Output>>
  where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
  {
    let mut inner = lock(&self.inner);
    if inner.sealed || inner.state.is_terminal() {
      return None;
    }
    inner.children.push(child);
    Some(self.children.spawn(driver))
  }

  /// Copy this node and its subtree into a `TaskNode`.
  pub(crate) fn snapshot(&self) -> TaskNode {
    let (mut node, children) = {
      let inner = lock(&self.inner);
      let node = TaskNode {
        id: self.id.clone(),
        parent_id: self.parent_id.clone(),
        name: self.name.clone(),
        param: self.param.clone(),
        state: inner.state,
        progress: inner.progress,
        total: inner.total,
        message: inner.message.clone(),
        error: inner.error.clone(),
        from: inner.from.clone(),
        to: inner.to.clone(),
        time: inner.time,
        children: Vec::new(),
      };
      (node, inner.children.clone())
    };
    node.children = children.iter().map(|c| c.snapshot()).collect();
    node
  }
}
