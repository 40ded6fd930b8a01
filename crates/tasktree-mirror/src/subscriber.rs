//! Mount lifecycle of a subscriber.

use std::future::Future;
use std::sync::Arc;

use tasktree_config::MirrorConfig;
use tasktree_model::{Batch, TaskNode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::reconciler::Reconciler;

/// Drives a [`Reconciler`] from a snapshot request and a batch stream.
pub struct Subscriber {
  reconciler: Arc<Reconciler>,
}

impl Subscriber {
  pub fn new(config: &MirrorConfig) -> Self {
    Self {
      reconciler: Arc::new(Reconciler::new(config)),
    }
  }

  pub fn reconciler(&self) -> &Arc<Reconciler> {
    &self.reconciler
  }

  /// Run until cancelled, or until the snapshot is in and the batch stream
  /// has closed.
  ///
  /// The snapshot and the batches are awaited concurrently; batches that
  /// win the race are held back until the snapshot is applied.
  pub async fn run<F>(
    &self,
    snapshot: F,
    mut batches: mpsc::UnboundedReceiver<Batch>,
    cancel: CancellationToken,
  ) where
    F: Future<Output = Vec<TaskNode>>,
  {
    tokio::pin!(snapshot);
    let mut synced = false;
    let mut open = true;

    while !(synced && !open) {
      tokio::select! {
        _ = cancel.cancelled() => {
          debug!("subscriber_cancelled");
          return;
        }
        forest = &mut snapshot, if !synced => {
          info!(roots = forest.len(), "subscriber_synced");
          self.reconciler.apply_snapshot(&forest);
          synced = true;
        }
        batch = batches.recv(), if open => match batch {
          Some(batch) => {
            self.reconciler.handle_batch(batch);
          }
          None => open = false,
        }
      }
    }
    debug!("subscriber_stream_closed");
  }
}
