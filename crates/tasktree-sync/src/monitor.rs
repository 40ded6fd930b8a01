//! Attaching an aggregator to a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tasktree_model::Batch;
use tasktree_runtime::{ListenerId, Session};
use tracing::debug;

use crate::aggregator::Aggregator;

/// An [`Aggregator`] registered as a listener on a session.
///
/// Dropping the monitor destroys it.
pub struct Monitor {
  aggregator: Arc<Aggregator>,
  session: Session,
  listener: ListenerId,
  destroyed: AtomicBool,
}

impl Monitor {
  pub fn attach(session: &Session) -> Self {
    Self::attach_aggregator(session, Aggregator::new())
  }

  /// Attach with a pending-count callback. See [`Aggregator::with_notify`].
  pub fn attach_with(
    session: &Session,
    on_queued: impl Fn(&Aggregator, usize) + Send + Sync + 'static,
  ) -> Self {
    Self::attach_aggregator(session, Aggregator::with_notify(on_queued))
  }

  fn attach_aggregator(session: &Session, aggregator: Aggregator) -> Self {
    let aggregator = Arc::new(aggregator);
    let listener = session.listen_arc(aggregator.clone());
    debug!(session_id = %session.id(), "monitor_attached");
    Self {
      aggregator,
      session: session.clone(),
      listener,
      destroyed: AtomicBool::new(false),
    }
  }

  pub fn aggregator(&self) -> &Arc<Aggregator> {
    &self.aggregator
  }

  pub fn flush(&self) -> Batch {
    self.aggregator.flush()
  }

  pub fn pending(&self) -> usize {
    self.aggregator.pending()
  }

  /// Unsubscribe from the session. Pending records stay flushable.
  pub fn destroy(&self) {
    if self.destroyed.swap(true, Ordering::SeqCst) {
      return;
    }
    self.aggregator.destroy();
    self.session.unlisten(self.listener);
    debug!(session_id = %self.session.id(), "monitor_destroyed");
  }
}

impl Drop for Monitor {
  fn drop(&mut self) {
    self.destroy();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tasktree_runtime::task_fn;

  #[tokio::test]
  async fn test_monitor_collects_session_events() {
    let session = Session::new();
    let monitor = Monitor::attach(&session);

    let handle = session.submit(task_fn("install", |ctx| async move {
      ctx.update(1, Some(2), Some("resolving"));
      ctx.update(2, Some(2), None);
      Ok(())
    }));
    let id = handle.id().clone();
    handle.wait().await.unwrap();

    let batch = monitor.flush();
    assert_eq!(batch.adds.len(), 1);
    assert_eq!(batch.adds[0].id, id);
    assert_eq!(batch.updates.len(), 1);
    assert_eq!(batch.updates[0].progress, Some(2));
    assert_eq!(batch.updates[0].message.as_deref(), Some("resolving"));
    assert_eq!(
      batch.updates[0].state,
      Some(tasktree_model::TaskState::Succeeded)
    );
  }

  #[tokio::test]
  async fn test_destroyed_monitor_ignores_events() {
    let session = Session::new();
    let monitor = Monitor::attach(&session);
    monitor.destroy();
    monitor.destroy();

    session
      .submit(task_fn("install", |_ctx| async move { Ok(()) }))
      .wait()
      .await
      .unwrap();

    assert!(monitor.flush().is_empty());
  }
}
