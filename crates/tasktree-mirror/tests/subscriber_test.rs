use std::time::Duration;

use chrono::Utc;
use tasktree_config::MirrorConfig;
use tasktree_mirror::Subscriber;
use tasktree_model::{Batch, TaskAdded, TaskId, TaskNode, TaskState, TaskUpdate};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

fn root(id: &str) -> TaskNode {
  TaskNode {
    id: TaskId::from(id),
    parent_id: None,
    name: id.to_string(),
    param: serde_json::Value::Null,
    state: TaskState::Running,
    progress: 0,
    total: None,
    message: None,
    error: None,
    from: None,
    to: None,
    time: Utc::now(),
    children: vec![],
  }
}

fn child_added(id: &str, parent: &str) -> Batch {
  Batch {
    adds: vec![TaskAdded {
      id: TaskId::from(id),
      parent_id: Some(TaskId::from(parent)),
      name: id.to_string(),
      param: serde_json::Value::Null,
      time: Utc::now(),
      from: None,
      to: None,
    }],
    updates: vec![],
  }
}

#[tokio::test]
async fn test_batch_before_snapshot_is_gated() {
  let subscriber = Subscriber::new(&MirrorConfig::default());
  let (tx, rx) = mpsc::unbounded_channel();
  let (snapshot_tx, snapshot_rx) = oneshot::channel::<Vec<TaskNode>>();

  // The batch references a parent that only the snapshot knows about
  tx.send(child_added("download", "install")).unwrap();
  let mut progress = TaskUpdate::empty(TaskId::from("download"), Utc::now());
  progress.progress = Some(40);
  tx.send(Batch {
    adds: vec![],
    updates: vec![progress],
  })
  .unwrap();

  let reconciler = subscriber.reconciler().clone();
  let run = subscriber.run(
    async move { snapshot_rx.await.unwrap_or_default() },
    rx,
    CancellationToken::new(),
  );
  let release = async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reconciler.is_synced());
    snapshot_tx.send(vec![root("install")]).unwrap();
    drop(tx);
  };
  tokio::join!(run, release);

  let reconciler = subscriber.reconciler();
  assert!(reconciler.is_synced());
  reconciler.read(|mirror| {
    let children = mirror.visible_children(&TaskId::from("install"));
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, TaskId::from("download"));
    assert_eq!(children[0].progress, 40);
  });
}

#[tokio::test]
async fn test_cancel_stops_run() {
  let subscriber = Subscriber::new(&MirrorConfig::default());
  let (_tx, rx) = mpsc::unbounded_channel();
  let cancel = CancellationToken::new();
  cancel.cancel();

  subscriber
    .run(std::future::pending(), rx, cancel)
    .await;

  assert!(!subscriber.reconciler().is_synced());
}
