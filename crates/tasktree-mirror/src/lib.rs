//! Tasktree Mirror
//!
//! The receiving end of the task stream: a local copy of the task forest
//! kept consistent from one snapshot plus a sequence of batches.
//!
//! # Architecture
//!
//! ```text
//! Subscriber::run
//! ├── snapshot future ──▶ Reconciler::apply_snapshot   - rebuilds, opens the gate
//! └── batch receiver  ──▶ Reconciler::handle_batch     - queued until the gate opens
//!                               │
//!                               ▼
//!                             Mirror                   - nodes, roots, child ordering
//! ```
//!
//! Batches that arrive before the snapshot are kept in arrival order and
//! applied right after it, so nothing is lost between subscribing and
//! receiving the initial state.

mod mirror;
mod ordering;
mod reconciler;
mod subscriber;

pub use mirror::{ApplyOutcome, Mirror, MirrorNode, MirrorView};
pub use ordering::ChildOrdering;
pub use reconciler::Reconciler;
pub use subscriber::Subscriber;
