//! Tasktree Runtime
//!
//! Runs hierarchical, long-running asynchronous tasks and reports their
//! lifecycle as a typed event stream.
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── submit(task) -> TaskHandle          - registers and spawns a root task
//! ├── snapshot() -> Vec<TaskNode>         - current forest of live roots
//! ├── pause/resume/cancel(id), operate()  - control any live node by id
//! └── listen(listener) -> ListenerId      - synchronous TaskEvent delivery
//!
//! TaskContext (handed to every task body)
//! ├── update / advance / set_total        - progress reporting
//! ├── execute(child) -> TaskHandle        - spawn a child task
//! └── checkpoint / cancelled              - cooperative pause and cancellation
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tasktree_runtime::{Session, task_fn};
//!
//! let session = Session::new();
//! let handle = session.submit(task_fn("install", |ctx| async move {
//!   let download = ctx.execute(task_fn("download", |ctx| async move {
//!     ctx.update(50, Some(100), None);
//!     Ok(())
//!   }));
//!   download.wait().await
//! }));
//! handle.wait().await?;
//! ```

mod context;
mod error;
mod events;
mod node;
mod session;
mod sync;
mod task;

pub use context::TaskContext;
pub use error::TaskError;
pub use events::{ChannelListener, ListenerId, NoopListener, TaskEvent, TaskEventKind, TaskListener};
pub use session::Session;
pub use task::{FnTask, Submittable, TaskHandle, task_fn};

pub use tasktree_model::{OperationKind, TaskId, TaskNode, TaskOperation, TaskState};
