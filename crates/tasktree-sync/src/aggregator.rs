//! Coalescing of lifecycle events into add/update records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tasktree_model::{Batch, TaskAdded, TaskId, TaskUpdate};
use tasktree_runtime::{TaskEvent, TaskEventKind, TaskListener};
use tracing::trace;

type QueuedCallback = Box<dyn Fn(&Aggregator, usize) + Send + Sync>;

#[derive(Default)]
struct Pending {
  adds: Vec<TaskAdded>,
  updates: Vec<TaskUpdate>,
  /// Position of each node's record in `updates`.
  index: HashMap<TaskId, usize>,
}

impl Pending {
  fn count(&self) -> usize {
    self.adds.len() + self.updates.len()
  }

  fn update_for(&mut self, event: &TaskEvent) -> &mut TaskUpdate {
    let slot = match self.index.get(&event.id) {
      Some(&slot) => slot,
      None => {
        self.updates.push(TaskUpdate::empty(event.id.clone(), event.time));
        self.index.insert(event.id.clone(), self.updates.len() - 1);
        self.updates.len() - 1
      }
    };
    &mut self.updates[slot]
  }
}

/// Accumulates events between flushes.
///
/// Repeated updates to one node within a flush window collapse into a single
/// record: `progress` and `total` keep the latest value, `chunk_size` is
/// summed, `message`, `error`, `from` and `to` keep the first non-empty
/// value, and `state` and `time` follow the latest event.
pub struct Aggregator {
  pending: Mutex<Pending>,
  destroyed: AtomicBool,
  on_queued: Option<QueuedCallback>,
}

impl Default for Aggregator {
  fn default() -> Self {
    Self::new()
  }
}

impl Aggregator {
  pub fn new() -> Self {
    Self {
      pending: Mutex::new(Pending::default()),
      destroyed: AtomicBool::new(false),
      on_queued: None,
    }
  }

  /// An aggregator that calls `on_queued` with the pending record count
  /// after every ingested event.
  ///
  /// The callback runs outside the aggregator's lock and may call `flush`.
  pub fn with_notify(on_queued: impl Fn(&Aggregator, usize) + Send + Sync + 'static) -> Self {
    Self {
      on_queued: Some(Box::new(on_queued)),
      ..Self::new()
    }
  }

  /// Fold one event into the pending batch.
  pub fn ingest(&self, event: &TaskEvent) {
    if self.is_destroyed() {
      return;
    }

    let count = {
      let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      match &event.kind {
        TaskEventKind::Started {
          parent_id,
          name,
          param,
          from,
          to,
        } => {
          pending.adds.push(TaskAdded {
            id: event.id.clone(),
            parent_id: parent_id.clone(),
            name: name.clone(),
            param: param.clone(),
            time: event.time,
            from: from.clone(),
            to: to.clone(),
          });
        }
        TaskEventKind::Updated {
          progress,
          total,
          message,
          from,
          to,
          chunk_size,
        } => {
          let update = pending.update_for(event);
          update.time = event.time;
          update.progress = Some(*progress);
          if total.is_some() {
            update.total = *total;
          }
          first_non_empty(&mut update.message, message);
          first_non_empty(&mut update.from, from);
          first_non_empty(&mut update.to, to);
          if let Some(chunk) = chunk_size {
            update.chunk_size = Some(update.chunk_size.unwrap_or(0).saturating_add(*chunk));
          }
        }
        kind => {
          let update = pending.update_for(event);
          update.time = event.time;
          update.state = Some(kind.state());
          if let TaskEventKind::Failed { error } = kind {
            first_non_empty(&mut update.error, &Some(error.clone()));
          }
        }
      }
      pending.count()
    };

    trace!(task_id = %event.id, pending = count, "event_queued");
    if let Some(on_queued) = &self.on_queued {
      on_queued(self, count);
    }
  }

  /// Drain everything accumulated so far.
  ///
  /// Two flushes with no events in between return an empty second batch.
  pub fn flush(&self) -> Batch {
    let pending = {
      let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      std::mem::take(&mut *pending)
    };
    Batch {
      adds: pending.adds,
      updates: pending.updates,
    }
  }

  /// Number of records waiting for the next flush.
  pub fn pending(&self) -> usize {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .count()
  }

  /// Stop accumulating. Records already pending can still be flushed.
  pub fn destroy(&self) {
    self.destroyed.store(true, Ordering::SeqCst);
  }

  pub fn is_destroyed(&self) -> bool {
    self.destroyed.load(Ordering::SeqCst)
  }
}

impl TaskListener for Aggregator {
  fn on_event(&self, event: &TaskEvent) {
    self.ingest(event);
  }
}

fn first_non_empty(slot: &mut Option<String>, value: &Option<String>) {
  if slot.as_deref().is_some_and(|s| !s.is_empty()) {
    return;
  }
  if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
    *slot = Some(value.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::AtomicUsize;

  use chrono::Utc;
  use tasktree_model::TaskState;

  fn event(id: &str, kind: TaskEventKind) -> TaskEvent {
    TaskEvent {
      id: TaskId::from(id),
      time: Utc::now(),
      kind,
    }
  }

  fn started(id: &str) -> TaskEvent {
    event(
      id,
      TaskEventKind::Started {
        parent_id: None,
        name: "install".to_string(),
        param: serde_json::json!({"version": "1.20.1"}),
        from: None,
        to: None,
      },
    )
  }

  fn updated(id: &str, progress: u64, chunk: Option<u64>, message: Option<&str>) -> TaskEvent {
    event(
      id,
      TaskEventKind::Updated {
        progress,
        total: Some(100),
        message: message.map(str::to_string),
        from: None,
        to: None,
        chunk_size: chunk,
      },
    )
  }

  #[test]
  fn test_flush_drains_adds_once() {
    let aggregator = Aggregator::new();
    aggregator.ingest(&started("a"));
    aggregator.ingest(&started("b"));

    let first = aggregator.flush();
    assert_eq!(first.adds.len(), 2);
    assert_eq!(first.adds[0].id, TaskId::from("a"));

    let second = aggregator.flush();
    assert!(second.is_empty());
  }

  #[test]
  fn test_chunk_sizes_accumulate() {
    let aggregator = Aggregator::new();
    aggregator.ingest(&updated("a", 10, Some(10), None));
    aggregator.ingest(&updated("a", 30, Some(20), None));
    aggregator.ingest(&updated("a", 35, Some(5), None));

    let batch = aggregator.flush();
    assert_eq!(batch.updates.len(), 1);
    assert_eq!(batch.updates[0].chunk_size, Some(35));
  }

  #[test]
  fn test_progress_last_write_wins() {
    let aggregator = Aggregator::new();
    for progress in [1, 5, 3] {
      aggregator.ingest(&updated("a", progress, None, None));
    }

    let batch = aggregator.flush();
    assert_eq!(batch.updates[0].progress, Some(3));
    assert_eq!(batch.updates[0].total, Some(100));
    assert_eq!(batch.updates[0].chunk_size, None);
  }

  #[test]
  fn test_message_first_non_empty_wins() {
    let aggregator = Aggregator::new();
    aggregator.ingest(&updated("a", 1, None, Some("")));
    aggregator.ingest(&updated("a", 2, None, Some("resolving")));
    aggregator.ingest(&updated("a", 3, None, Some("downloading")));

    let batch = aggregator.flush();
    assert_eq!(batch.updates[0].message.as_deref(), Some("resolving"));
  }

  #[test]
  fn test_status_merges_into_update() {
    let aggregator = Aggregator::new();
    aggregator.ingest(&updated("a", 1, None, None));
    aggregator.ingest(&event("a", TaskEventKind::Paused));
    aggregator.ingest(&event(
      "a",
      TaskEventKind::Failed {
        error: "disk full".to_string(),
      },
    ));
    aggregator.ingest(&event("b", TaskEventKind::Cancelled));

    let batch = aggregator.flush();
    assert_eq!(batch.updates.len(), 2);
    assert_eq!(batch.updates[0].state, Some(TaskState::Failed));
    assert_eq!(batch.updates[0].error.as_deref(), Some("disk full"));
    assert_eq!(batch.updates[0].progress, Some(1));
    assert_eq!(batch.updates[1].id, TaskId::from("b"));
    assert_eq!(batch.updates[1].state, Some(TaskState::Cancelled));
  }

  #[test]
  fn test_destroy_stops_accumulation_but_keeps_pending() {
    let aggregator = Aggregator::new();
    aggregator.ingest(&started("a"));
    aggregator.destroy();
    aggregator.ingest(&started("b"));

    assert_eq!(aggregator.flush().adds.len(), 1);
    assert!(aggregator.flush().is_empty());
  }

  #[test]
  fn test_notify_reports_pending_count() {
    let seen = Arc::new(AtomicUsize::new(0));
    let last = seen.clone();
    let aggregator = Aggregator::with_notify(move |_, count| {
      last.store(count, Ordering::SeqCst);
    });

    aggregator.ingest(&started("a"));
    aggregator.ingest(&updated("a", 1, None, None));
    aggregator.ingest(&updated("a", 2, None, None));

    // One add plus one coalesced update
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(aggregator.pending(), 2);
  }

  #[test]
  fn test_notify_can_flush() {
    let flushed = Arc::new(AtomicUsize::new(0));
    let counter = flushed.clone();
    let aggregator = Aggregator::with_notify(move |aggregator, count| {
      if count > 1 {
        counter.fetch_add(aggregator.flush().len(), Ordering::SeqCst);
      }
    });

    aggregator.ingest(&started("a"));
    aggregator.ingest(&started("b"));

    assert_eq!(flushed.load(Ordering::SeqCst), 2);
    assert_eq!(aggregator.pending(), 0);
  }
}
