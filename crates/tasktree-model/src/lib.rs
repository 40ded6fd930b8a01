//! Tasktree Model
//!
//! Serializable types shared by both sides of the task sync boundary:
//! the task tree snapshot ([`TaskNode`]), the lifecycle state ([`TaskState`]),
//! and the incremental wire records ([`TaskAdded`], [`TaskUpdate`], [`Batch`]).
//!
//! The host side produces these from the live runtime; the UI side consumes
//! them to keep a local mirror of the task forest.

mod batch;
mod id;
mod node;
mod operation;
mod state;

pub use batch::{Batch, TaskAdded, TaskUpdate};
pub use id::TaskId;
pub use node::TaskNode;
pub use operation::{OperationKind, TaskOperation};
pub use state::TaskState;
