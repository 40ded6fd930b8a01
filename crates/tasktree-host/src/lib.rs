//! Tasktree Host
//!
//! The host side of the task transport. A [`TaskHost`] owns the session and
//! keeps one [`Pusher`](tasktree_sync::Pusher) per subscribed client.
//!
//! ```text
//! client ──subscribe──────▶ TaskHost ──▶ Pusher(client) ──task-update──▶ BatchSink
//!        ◀──snapshot──────┘
//!        ──task-operation─▶ Session::operate
//!        ──unsubscribe────▶ Pusher::dispose
//! ```

mod host;
mod request;

pub use host::{ClientId, TaskHost};
pub use request::{HostRequest, HostResponse};
