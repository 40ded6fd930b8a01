//! Lifecycle events and listeners.
//!
//! Every state change of a task node is emitted as a [`TaskEvent`] to all
//! registered [`TaskListener`]s, synchronously, before the change returns to
//! its caller. Batching is a listener concern, not the runtime's.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasktree_model::{TaskId, TaskState};
use tokio::sync::mpsc;

use crate::sync::{read, write};

/// A lifecycle event for one task node.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
  pub id: TaskId,
  pub time: DateTime<Utc>,
  pub kind: TaskEventKind,
}

/// The closed set of lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEventKind {
  /// The node started running. Emitted exactly once per node.
  Started {
    parent_id: Option<TaskId>,
    name: String,
    param: serde_json::Value,
    from: Option<String>,
    to: Option<String>,
  },

  /// The node reported progress.
  Updated {
    progress: u64,
    total: Option<u64>,
    message: Option<String>,
    from: Option<String>,
    to: Option<String>,
    /// Units completed by this update, when reported incrementally.
    chunk_size: Option<u64>,
  },

  Paused,

  Resumed,

  Succeeded,

  /// The node failed; `error` is the normalized failure reason.
  Failed { error: String },

  Cancelled,
}

impl TaskEventKind {
  /// The state a node is in right after this event.
  pub fn state(&self) -> TaskState {
    match self {
      TaskEventKind::Started { .. } | TaskEventKind::Updated { .. } | TaskEventKind::Resumed => {
        TaskState::Running
      }
      TaskEventKind::Paused => TaskState::Paused,
      TaskEventKind::Succeeded => TaskState::Succeeded,
      TaskEventKind::Failed { .. } => TaskState::Failed,
      TaskEventKind::Cancelled => TaskState::Cancelled,
    }
  }

  /// Whether this event is a state transition rather than a progress report.
  pub fn is_status(&self) -> bool {
    !matches!(
      self,
      TaskEventKind::Started { .. } | TaskEventKind::Updated { .. }
    )
  }
}

/// Trait for receiving task lifecycle events.
///
/// `on_event` runs on the thread that caused the transition, while the node
/// is locked, so implementations must be quick and must not call back into
/// the session.
pub trait TaskListener: Send + Sync {
  fn on_event(&self, event: &TaskEvent);
}

impl<F> TaskListener for F
where
  F: Fn(&TaskEvent) + Send + Sync,
{
  fn on_event(&self, event: &TaskEvent) {
    self(event)
  }
}

/// A listener that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopListener;

impl TaskListener for NoopListener {
  fn on_event(&self, _event: &TaskEvent) {}
}

/// A listener that forwards events to an unbounded channel.
///
/// Use this to consume events asynchronously, away from the emitting task.
#[derive(Debug, Clone)]
pub struct ChannelListener {
  sender: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelListener {
  pub fn new(sender: mpsc::UnboundedSender<TaskEvent>) -> Self {
    Self { sender }
  }
}

impl TaskListener for ChannelListener {
  fn on_event(&self, event: &TaskEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event.clone());
  }
}

/// Handle returned by `Session::listen`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out of events to the registered listeners of one session.
#[derive(Default)]
pub(crate) struct EventBus {
  next_id: AtomicU64,
  listeners: RwLock<Vec<(ListenerId, Arc<dyn TaskListener>)>>,
}

impl EventBus {
  pub(crate) fn add(&self, listener: Arc<dyn TaskListener>) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    write(&self.listeners).push((id, listener));
    id
  }

  pub(crate) fn remove(&self, id: ListenerId) -> bool {
    let mut listeners = write(&self.listeners);
    let before = listeners.len();
    listeners.retain(|(lid, _)| *lid != id);
    listeners.len() != before
  }

  pub(crate) fn clear(&self) {
    write(&self.listeners).clear();
  }

  pub(crate) fn emit(&self, event: TaskEvent) {
    let listeners: Vec<Arc<dyn TaskListener>> = read(&self.listeners)
      .iter()
      .map(|(_, l)| l.clone())
      .collect();
    for listener in listeners {
      listener.on_event(&event);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  fn event(kind: TaskEventKind) -> TaskEvent {
    TaskEvent {
      id: TaskId::from("t"),
      time: Utc::now(),
      kind,
    }
  }

  #[test]
  fn test_bus_fans_out_and_removes() {
    let bus = EventBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let id = bus.add(Arc::new(move |e: &TaskEvent| {
      sink.lock().unwrap().push(e.kind.clone());
    }));

    bus.emit(event(TaskEventKind::Paused));
    assert!(bus.remove(id));
    assert!(!bus.remove(id));
    bus.emit(event(TaskEventKind::Resumed));

    assert_eq!(*seen.lock().unwrap(), vec![TaskEventKind::Paused]);
  }

  #[tokio::test]
  async fn test_channel_listener() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = ChannelListener::new(tx);

    listener.on_event(&event(TaskEventKind::Succeeded));

    let received = rx.recv().await.unwrap();
    assert_eq!(received.kind, TaskEventKind::Succeeded);
  }

  #[test]
  fn test_event_kind_state() {
    assert_eq!(TaskEventKind::Paused.state(), TaskState::Paused);
    assert_eq!(
      TaskEventKind::Failed {
        error: "x".to_string()
      }
      .state(),
      TaskState::Failed
    );
    assert!(TaskEventKind::Cancelled.is_status());
    assert!(
      !TaskEventKind::Updated {
        progress: 1,
        total: None,
        message: None,
        from: None,
        to: None,
        chunk_size: None,
      }
      .is_status()
    );
  }
}
