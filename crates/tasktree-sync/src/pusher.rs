//! Interval and threshold driven batch delivery.

use std::sync::Arc;
use std::time::Duration;

use tasktree_config::SyncConfig;
use tasktree_runtime::Session;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::monitor::Monitor;
use crate::sink::BatchSink;

/// Pushes one session's accumulated changes to one sink.
///
/// A batch is sent once more than `threshold` records are pending, and on
/// every `interval` tick that has something to send. There is no final
/// flush on dispose; records pending at that point are dropped.
/// Dropping the pusher disposes it.
///
/// Every batch is drained and sent by the pusher's own task, so batches reach
/// the sink in drain order and the sink never runs inside event delivery.
pub struct Pusher {
  monitor: Monitor,
  cancel: CancellationToken,
}

impl Pusher {
  /// Start pushing. Must be called from within a tokio runtime.
  pub fn start(session: &Session, config: &SyncConfig, sink: Arc<dyn BatchSink>) -> Self {
    let threshold = config.threshold;
    let wake = Arc::new(Notify::new());
    let signal = wake.clone();
    let monitor = Monitor::attach_with(session, move |_, pending| {
      if pending > threshold {
        signal.notify_one();
      }
    });

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let aggregator = monitor.aggregator().clone();
    // interval_at panics on a zero period
    let period = config.interval().max(Duration::from_millis(1));

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        let trigger = tokio::select! {
          _ = token.cancelled() => break,
          _ = wake.notified() => "threshold_flush",
          _ = ticker.tick() => "interval_flush",
        };

        let batch = aggregator.flush();
        if !batch.is_empty() {
          debug!(records = batch.len(), trigger, "batch_flushed");
          sink.send(batch);
        }
      }
    });

    info!(
      session_id = %session.id(),
      interval_ms = config.interval_ms,
      threshold = config.threshold,
      "pusher_started"
    );

    Self { monitor, cancel }
  }

  /// Stop the timer and detach from the session.
  pub fn dispose(&self) {
    if self.cancel.is_cancelled() {
      return;
    }
    self.cancel.cancel();
    self.monitor.destroy();
    debug!("pusher_disposed");
  }

  pub fn is_disposed(&self) -> bool {
    self.cancel.is_cancelled()
  }
}

impl Drop for Pusher {
  fn drop(&mut self) {
    self.dispose();
  }
}
