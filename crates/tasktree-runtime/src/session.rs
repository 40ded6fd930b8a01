//! Task session: registry, submission and control.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tasktree_model::{OperationKind, TaskId, TaskNode, TaskOperation, TaskState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::events::{EventBus, ListenerId, TaskListener};
use crate::node::{Settlement, TaskCell, TaskMeta};
use crate::sync::lock;
use crate::task::{Submittable, TaskHandle};

/// Live nodes, indexed for control by id.
#[derive(Default)]
struct Registry {
  /// Live roots in submission order.
  roots: Vec<Arc<TaskCell>>,
  nodes: HashMap<TaskId, Arc<TaskCell>>,
  /// Every node id registered under a root, so a settled root can be evicted
  /// together with its subtree.
  subtrees: HashMap<TaskId, Vec<TaskId>>,
}

struct SessionShared {
  id: String,
  bus: Arc<EventBus>,
  registry: Mutex<Registry>,
  cancel: CancellationToken,
  disposed: AtomicBool,
}

/// A task session.
///
/// Owns the registry of live task trees and the listeners observing them.
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct Session {
  shared: Arc<SessionShared>,
}

impl Default for Session {
  fn default() -> Self {
    Self::new()
  }
}

impl Session {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(SessionShared {
        id: uuid::Uuid::new_v4().to_string(),
        bus: Arc::new(EventBus::default()),
        registry: Mutex::new(Registry::default()),
        cancel: CancellationToken::new(),
        disposed: AtomicBool::new(false),
      }),
    }
  }

  pub fn id(&self) -> &str {
    &self.shared.id
  }

  /// Submit a root task and start running it.
  ///
  /// Must be called from within a tokio runtime. A disposed session rejects
  /// the task; its handle resolves to `TaskError::Cancelled`.
  pub fn submit<T: Submittable>(&self, task: T) -> TaskHandle<T::Output> {
    let id = TaskId::new(uuid::Uuid::new_v4().to_string());
    if self.is_disposed() {
      warn!(session_id = %self.shared.id, name = %task.name(), "submit on disposed session");
      return TaskHandle::rejected(id, TaskError::Cancelled);
    }

    let cell = Arc::new(TaskCell::new(
      id.clone(),
      None,
      id.clone(),
      meta_of(&task),
      self.shared.cancel.child_token(),
      None,
      self.shared.bus.clone(),
    ));

    {
      let mut registry = lock(&self.shared.registry);
      registry.roots.push(cell.clone());
      registry.nodes.insert(id.clone(), cell.clone());
      registry.subtrees.insert(id.clone(), vec![id.clone()]);
    }

    let join = tokio::spawn(drive(self.clone(), cell, task));
    TaskHandle::spawned(id, join)
  }

  pub(crate) fn spawn_child<T: Submittable>(
    &self,
    parent: &Arc<TaskCell>,
    task: T,
  ) -> TaskHandle<T::Output> {
    let id = TaskId::new(uuid::Uuid::new_v4().to_string());
    let cell = Arc::new(TaskCell::new(
      id.clone(),
      Some(parent.id.clone()),
      parent.root_id.clone(),
      meta_of(&task),
      parent.cancel.child_token(),
      Some(parent.subscribe_paused()),
      self.shared.bus.clone(),
    ));

    // Registered before spawning so the root's eviction always sees it
    {
      let mut registry = lock(&self.shared.registry);
      registry.nodes.insert(id.clone(), cell.clone());
      registry
        .subtrees
        .entry(parent.root_id.clone())
        .or_default()
        .push(id.clone());
    }

    let name = task.name().to_string();
    let Some(join) = parent.spawn_child(cell.clone(), drive(self.clone(), cell, task)) else {
      debug!(parent_id = %parent.id, name = %name, "child spawned under settling parent");
      let mut registry = lock(&self.shared.registry);
      registry.nodes.remove(&id);
      if let Some(ids) = registry.subtrees.get_mut(&parent.root_id) {
        ids.retain(|other| other != &id);
        // The root itself was already evicted
        if ids.is_empty() {
          registry.subtrees.remove(&parent.root_id);
        }
      }
      return TaskHandle::rejected(id, TaskError::Cancelled);
    };

    TaskHandle::spawned(id, join)
  }

  /// The current forest of live roots, in submission order.
  pub fn snapshot(&self) -> Vec<TaskNode> {
    let roots = lock(&self.shared.registry).roots.clone();
    roots.iter().map(|root| root.snapshot()).collect()
  }

  /// State of a live node.
  pub fn state(&self, id: &TaskId) -> Option<TaskState> {
    self.find(id).map(|cell| cell.state())
  }

  /// The most recently submitted root that has not settled yet.
  pub fn active(&self) -> Option<TaskId> {
    let roots = lock(&self.shared.registry).roots.clone();
    roots
      .iter()
      .rev()
      .find(|root| !root.state().is_terminal())
      .map(|root| root.id.clone())
  }

  /// Pause a live node and its subtree. No-op unless the node is running.
  pub fn pause(&self, id: &TaskId) -> bool {
    match self.find(id) {
      Some(cell) => cell.pause(),
      None => {
        warn!(task_id = %id, "cannot pause an unknown task id");
        false
      }
    }
  }

  /// Resume a paused node and its subtree.
  pub fn resume(&self, id: &TaskId) -> bool {
    match self.find(id) {
      Some(cell) => cell.resume(),
      None => {
        warn!(task_id = %id, "cannot resume an unknown task id");
        false
      }
    }
  }

  /// Request cancellation of a live node and its subtree.
  pub fn cancel(&self, id: &TaskId) -> bool {
    match self.find(id) {
      Some(cell) => cell.request_cancel(),
      None => {
        warn!(task_id = %id, "cannot cancel an unknown task id");
        false
      }
    }
  }

  /// Apply a `task-operation` request.
  pub fn operate(&self, op: &TaskOperation) -> bool {
    match op.kind {
      OperationKind::Pause => self.pause(&op.id),
      OperationKind::Resume => self.resume(&op.id),
      OperationKind::Cancel => self.cancel(&op.id),
    }
  }

  /// Register a listener for every lifecycle event in this session.
  pub fn listen(&self, listener: impl TaskListener + 'static) -> ListenerId {
    self.listen_arc(Arc::new(listener))
  }

  pub fn listen_arc(&self, listener: Arc<dyn TaskListener>) -> ListenerId {
    self.shared.bus.add(listener)
  }

  pub fn unlisten(&self, id: ListenerId) -> bool {
    self.shared.bus.remove(id)
  }

  /// Cancel every live task and drop all listeners.
  pub fn dispose(&self) {
    if self.shared.disposed.swap(true, Ordering::SeqCst) {
      return;
    }
    info!(session_id = %self.shared.id, "session_disposed");
    self.shared.cancel.cancel();
    self.shared.bus.clear();
  }

  pub fn is_disposed(&self) -> bool {
    self.shared.disposed.load(Ordering::SeqCst)
  }

  fn find(&self, id: &TaskId) -> Option<Arc<TaskCell>> {
    lock(&self.shared.registry).nodes.get(id).cloned()
  }

  /// Drop a settled root and its subtree from the registry.
  fn evict(&self, root: &TaskId) {
    let mut registry = lock(&self.shared.registry);
    registry.roots.retain(|cell| &cell.id != root);
    if let Some(ids) = registry.subtrees.remove(root) {
      for id in ids {
        registry.nodes.remove(&id);
      }
    }
  }
}

fn meta_of<T: Submittable>(task: &T) -> TaskMeta {
  TaskMeta {
    name: task.name().to_string(),
    param: task.param(),
    from: task.from(),
    to: task.to(),
  }
}

/// Run one node: start it, run the body, wait for its children, settle.
#[instrument(
  name = "task_execute",
  skip_all,
  fields(
    task_id = %cell.id,
    task_name = %cell.name,
  )
)]
async fn drive<T: Submittable>(
  session: Session,
  cell: Arc<TaskCell>,
  task: T,
) -> Result<T::Output, TaskError> {
  cell.start();

  let ctx = TaskContext::new(cell.clone(), session.clone());
  let result = match AssertUnwindSafe(task.run(ctx)).catch_unwind().await {
    Ok(result) => result,
    Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
  };

  // A node settles only after every child it spawned has settled
  cell.seal();
  cell.children.wait().await;

  let settlement = match &result {
    Ok(_) => {
      info!(task_id = %cell.id, "task_completed");
      Settlement::Succeeded
    }
    Err(e) if e.is_cancelled() || cell.cancel.is_cancelled() => {
      info!(task_id = %cell.id, "task_cancelled");
      Settlement::Cancelled
    }
    Err(e) => {
      error!(task_id = %cell.id, error = %e, "task_failed");
      Settlement::Failed(e.normalize())
    }
  };
  cell.settle(settlement);

  if cell.parent_id.is_none() {
    session.evict(&cell.id);
  }

  result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
