//! Tasktree Sync
//!
//! Turns a session's per-transition event stream into bounded batches.
//!
//! ```text
//! Session ──TaskEvent──▶ Aggregator (coalesces by id)
//!                          │
//!                          └─ on_queued(pending > threshold) ──▶ Notify ─┐
//!                                                                        ▼
//!                     Pusher task: interval tick | notified ──▶ flush() ──▶ BatchSink
//! ```
//!
//! A [`Monitor`] attaches an [`Aggregator`] to a [`Session`](tasktree_runtime::Session).
//! A [`Pusher`] owns a monitor and drains it into a [`BatchSink`] whenever
//! the pending count crosses the threshold and on every non-empty interval
//! tick. Draining and sending both happen on the pusher's one task.

mod aggregator;
mod monitor;
mod pusher;
mod sink;

pub use aggregator::Aggregator;
pub use monitor::Monitor;
pub use pusher::Pusher;
pub use sink::{BatchSink, ChannelSink};
