//! Submittable units of work and their handles.

use std::future::Future;

use tasktree_model::TaskId;
use tokio::task::JoinHandle;

use crate::context::TaskContext;
use crate::error::TaskError;

/// A unit of work the runtime can run as a task node.
///
/// `name` and `param` describe the node to observers (usually a display or
/// localization key plus its arguments). `run` consumes the task and drives
/// it to completion, reporting progress and spawning children through the
/// context.
pub trait Submittable: Send + 'static {
  type Output: Send + 'static;

  fn name(&self) -> &str;

  fn param(&self) -> serde_json::Value {
    serde_json::Value::Null
  }

  fn from(&self) -> Option<String> {
    None
  }

  fn to(&self) -> Option<String> {
    None
  }

  fn run(self, ctx: TaskContext) -> impl Future<Output = Result<Self::Output, TaskError>> + Send;
}

/// A task built from an async closure. See [`task_fn`].
pub struct FnTask<F> {
  name: String,
  param: serde_json::Value,
  from: Option<String>,
  to: Option<String>,
  body: F,
}

/// Build a task from a name and an async closure taking the context.
pub fn task_fn<F, Fut, T>(name: impl Into<String>, body: F) -> FnTask<F>
where
  F: FnOnce(TaskContext) -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
  T: Send + 'static,
{
  FnTask {
    name: name.into(),
    param: serde_json::Value::Null,
    from: None,
    to: None,
    body,
  }
}

impl<F> FnTask<F> {
  pub fn with_param(mut self, param: serde_json::Value) -> Self {
    self.param = param;
    self
  }

  pub fn with_from(mut self, from: impl Into<String>) -> Self {
    self.from = Some(from.into());
    self
  }

  pub fn with_to(mut self, to: impl Into<String>) -> Self {
    self.to = Some(to.into());
    self
  }
}

impl<F, Fut, T> Submittable for FnTask<F>
where
  F: FnOnce(TaskContext) -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
  T: Send + 'static,
{
  type Output = T;

  fn name(&self) -> &str {
    &self.name
  }

  fn param(&self) -> serde_json::Value {
    self.param.clone()
  }

  fn from(&self) -> Option<String> {
    self.from.clone()
  }

  fn to(&self) -> Option<String> {
    self.to.clone()
  }

  fn run(self, ctx: TaskContext) -> impl Future<Output = Result<T, TaskError>> + Send {
    (self.body)(ctx)
  }
}

/// A handle to a submitted task.
///
/// Call `.wait()` to get the task's result once it and all of its children
/// have settled.
pub struct TaskHandle<T> {
  id: TaskId,
  inner: HandleInner<T>,
}

enum HandleInner<T> {
  Spawned(JoinHandle<Result<T, TaskError>>),
  Rejected(TaskError),
}

impl<T> TaskHandle<T> {
  pub(crate) fn spawned(id: TaskId, join: JoinHandle<Result<T, TaskError>>) -> Self {
    Self {
      id,
      inner: HandleInner::Spawned(join),
    }
  }

  /// A handle for a task that was never started.
  pub(crate) fn rejected(id: TaskId, error: TaskError) -> Self {
    Self {
      id,
      inner: HandleInner::Rejected(error),
    }
  }

  pub fn id(&self) -> &TaskId {
    &self.id
  }

  /// Wait for the task to settle.
  pub async fn wait(self) -> Result<T, TaskError> {
    match self.inner {
      HandleInner::Spawned(join) => match join.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(TaskError::Cancelled),
        Err(e) => Err(TaskError::Panicked(e.to_string())),
      },
      HandleInner::Rejected(error) => Err(error),
    }
  }
}
