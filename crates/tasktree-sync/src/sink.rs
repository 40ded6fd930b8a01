//! Transport endpoints for batches.

use tasktree_model::Batch;
use tokio::sync::mpsc;

/// Where a pusher delivers its batches.
///
/// `send` runs on the pusher's task, one batch at a time and in order. It
/// should not block for long, since it holds up the next flush.
pub trait BatchSink: Send + Sync {
  fn send(&self, batch: Batch);
}

impl<F> BatchSink for F
where
  F: Fn(Batch) + Send + Sync,
{
  fn send(&self, batch: Batch) {
    self(batch)
  }
}

/// A sink that forwards batches to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  sender: mpsc::UnboundedSender<Batch>,
}

impl ChannelSink {
  pub fn new(sender: mpsc::UnboundedSender<Batch>) -> Self {
    Self { sender }
  }

  /// A sink plus the receiver its batches arrive on.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Batch>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl BatchSink for ChannelSink {
  fn send(&self, batch: Batch) {
    // Ignore send errors - the subscriber may have gone away
    let _ = self.sender.send(batch);
  }
}
