use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tasktree_config::SyncConfig;
use tasktree_model::{TaskNode, TaskOperation};
use tasktree_runtime::{Session, Submittable, TaskHandle};
use tasktree_sync::{BatchSink, Pusher};
use tracing::{debug, info, warn};

use crate::request::{HostRequest, HostResponse};

/// Identifies one subscriber channel.
pub type ClientId = String;

/// Host-side bridge between a session and its subscribers.
pub struct TaskHost {
  session: Session,
  config: SyncConfig,
  pushers: Mutex<HashMap<ClientId, Pusher>>,
}

impl TaskHost {
  pub fn new(session: Session, config: SyncConfig) -> Self {
    Self {
      session,
      config,
      pushers: Mutex::new(HashMap::new()),
    }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  fn pushers(&self) -> MutexGuard<'_, HashMap<ClientId, Pusher>> {
    self.pushers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Start pushing to `client` and return the current snapshot.
  ///
  /// The pusher is attached before the snapshot is taken, so every change
  /// after the snapshot reaches the sink. A client that subscribes again
  /// replaces its previous pusher.
  pub fn subscribe(&self, client: impl Into<ClientId>, sink: Arc<dyn BatchSink>) -> Vec<TaskNode> {
    let client = client.into();
    let pusher = Pusher::start(&self.session, &self.config, sink);
    let previous = self.pushers().insert(client.clone(), pusher);
    if let Some(previous) = previous {
      debug!(client = %client, "replacing existing subscription");
      previous.dispose();
    }

    let snapshot = self.session.snapshot();
    info!(client = %client, roots = snapshot.len(), "client_subscribed");
    snapshot
  }

  /// Stop pushing to `client`. Unknown clients are ignored.
  pub fn unsubscribe(&self, client: &str) -> bool {
    let removed = self.pushers().remove(client);
    match removed {
      Some(pusher) => {
        pusher.dispose();
        info!(client = %client, "client_unsubscribed");
        true
      }
      None => false,
    }
  }

  /// Apply a `task-operation`. Unknown ids are logged and ignored.
  pub fn operate(&self, op: &TaskOperation) -> bool {
    let applied = self.session.operate(op);
    if !applied {
      warn!(task_id = %op.id, operation = ?op.kind, "task operation not applied");
    }
    applied
  }

  /// Handle one request from a client.
  pub fn handle(&self, client: &str, request: HostRequest, sink: Arc<dyn BatchSink>) -> HostResponse {
    match request {
      HostRequest::Subscribe => HostResponse::Snapshot(self.subscribe(client, sink)),
      HostRequest::Unsubscribe => HostResponse::Done(self.unsubscribe(client)),
      HostRequest::TaskOperation(op) => HostResponse::Done(self.operate(&op)),
    }
  }

  pub fn submit<T: Submittable>(&self, task: T) -> TaskHandle<T::Output> {
    self.session.submit(task)
  }

  pub fn subscribers(&self) -> usize {
    self.pushers().len()
  }

  /// Dispose every pusher, then the session.
  pub fn dispose(&self) {
    let pushers: Vec<Pusher> = self.pushers().drain().map(|(_, p)| p).collect();
    for pusher in &pushers {
      pusher.dispose();
    }
    self.session.dispose();
    info!(clients = pushers.len(), "task_host_disposed");
  }
}
