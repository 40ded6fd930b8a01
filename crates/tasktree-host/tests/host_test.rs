use std::sync::Arc;
use std::time::Duration;

use tasktree_config::{MirrorConfig, SyncConfig};
use tasktree_host::{HostRequest, HostResponse, TaskHost};
use tasktree_mirror::{Mirror, Subscriber};
use tasktree_model::{Batch, OperationKind, TaskId, TaskOperation, TaskState};
use tasktree_runtime::{Session, TaskError, task_fn};
use tasktree_sync::ChannelSink;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_install_scenario_reaches_mirror() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let (sink, batches) = ChannelSink::channel();
  let snapshot = host.subscribe("ui", Arc::new(sink));
  assert!(snapshot.is_empty());

  let handle = host.submit(task_fn("install", |ctx| async move {
    let download = ctx.execute(task_fn("download", |ctx| async move {
      ctx.update(50, Some(100), None);
      Ok(())
    }));
    download.wait().await
  }));
  let root = handle.id().clone();
  handle.wait().await.unwrap();

  let subscriber = Subscriber::new(&MirrorConfig::default());
  let cancel = CancellationToken::new();
  let stop = cancel.clone();
  tokio::join!(
    subscriber.run(async move { snapshot }, batches, cancel),
    async move {
      tokio::time::sleep(Duration::from_millis(1_000)).await;
      stop.cancel();
    }
  );

  subscriber.reconciler().read(|mirror| {
    let install = mirror.get(&root).expect("root mirrored");
    assert_eq!(install.name, "install");
    assert_eq!(install.state, TaskState::Succeeded);

    let children = mirror.visible_children(&root);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "download");
    assert_eq!(children[0].progress, 50);
    assert_eq!(children[0].total, Some(100));
    assert_eq!(children[0].state, TaskState::Succeeded);
  });
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_mid_flight_gets_snapshot_then_changes() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let (release_tx, release_rx) = oneshot::channel::<()>();

  let handle = host.submit(task_fn("launch", |ctx| async move {
    ctx.update(1, Some(2), Some("preparing"));
    let _ = release_rx.await;
    ctx.update(2, Some(2), None);
    Ok(())
  }));
  let root = handle.id().clone();
  tokio::task::yield_now().await;

  let (sink, batches) = ChannelSink::channel();
  let snapshot = host.subscribe("ui", Arc::new(sink));
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot[0].id, root);
  assert_eq!(snapshot[0].progress, 1);

  release_tx.send(()).unwrap();
  handle.wait().await.unwrap();

  let subscriber = Subscriber::new(&MirrorConfig::default());
  let cancel = CancellationToken::new();
  let stop = cancel.clone();
  tokio::join!(
    subscriber.run(async move { snapshot }, batches, cancel),
    async move {
      tokio::time::sleep(Duration::from_millis(1_000)).await;
      stop.cancel();
    }
  );

  subscriber.reconciler().read(|mirror| {
    let launch = mirror.get(&root).unwrap();
    assert_eq!(launch.progress, 2);
    assert_eq!(launch.state, TaskState::Succeeded);
    assert_eq!(mirror.roots().count(), 1);
  });
}

#[tokio::test]
async fn test_operate_cancels_by_id() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let handle = host.submit(task_fn("download", |ctx| async move {
    ctx.cancelled().await;
    Err::<(), _>(TaskError::Cancelled)
  }));
  let id = handle.id().clone();
  tokio::task::yield_now().await;

  assert!(host.operate(&TaskOperation::new(OperationKind::Cancel, id)));
  assert!(handle.wait().await.unwrap_err().is_cancelled());

  // Evicted once settled, so the id is unknown now
  assert!(!host.operate(&TaskOperation::new(
    OperationKind::Pause,
    TaskId::from("missing")
  )));
}

#[tokio::test]
async fn test_subscription_lifecycle() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let (first, _first_rx) = ChannelSink::channel();
  let (second, _second_rx) = ChannelSink::channel();

  host.subscribe("ui", Arc::new(first));
  host.subscribe("ui", Arc::new(second));
  assert_eq!(host.subscribers(), 1);

  assert!(host.unsubscribe("ui"));
  assert!(!host.unsubscribe("ui"));
  assert_eq!(host.subscribers(), 0);
}

#[tokio::test]
async fn test_handle_requests() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let (sink, _rx) = ChannelSink::channel();
  let sink = Arc::new(sink);

  let response = host.handle("ui", HostRequest::Subscribe, sink.clone());
  assert_eq!(response, HostResponse::Snapshot(vec![]));

  let op = TaskOperation::new(OperationKind::Resume, "nope");
  let response = host.handle("ui", HostRequest::TaskOperation(op), sink.clone());
  assert_eq!(response, HostResponse::Done(false));

  let response = host.handle("ui", HostRequest::Unsubscribe, sink);
  assert_eq!(response, HostResponse::Done(true));
}

#[tokio::test]
async fn test_dispose_stops_everything() {
  let host = TaskHost::new(Session::new(), SyncConfig::default());
  let (sink, _rx) = ChannelSink::channel();
  host.subscribe("ui", Arc::new(sink));

  host.dispose();

  assert_eq!(host.subscribers(), 0);
  assert!(host.session().is_disposed());
  let rejected = host.submit(task_fn("late", |_ctx| async move { Ok(()) }));
  assert!(rejected.wait().await.unwrap_err().is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tree_is_fully_mirrored() {
  let host = TaskHost::new(
    Session::new(),
    SyncConfig {
      interval_ms: 1,
      threshold: 3,
    },
  );
  let (tx, mut rx) = mpsc::unbounded_channel();
  let snapshot = host.subscribe(
    "ui",
    Arc::new(move |batch: Batch| {
      // Cross the wire as the client would see it
      let wire = serde_json::to_string(&batch).unwrap();
      let _ = tx.send(serde_json::from_str::<Batch>(&wire).unwrap());
    }),
  );
  assert!(snapshot.is_empty());

  let mut handles = Vec::new();
  for i in 0..32 {
    handles.push(host.submit(task_fn(format!("install.{i}"), |ctx| async move {
      let mut children = Vec::new();
      for j in 0..4 {
        children.push(ctx.execute(task_fn(format!("download.{j}"), |ctx| async move {
          for step in 1..=10 {
            ctx.update(step, Some(10), None);
            tokio::task::yield_now().await;
          }
          Ok(())
        })));
      }
      for child in children {
        child.wait().await?;
      }
      Ok::<(), TaskError>(())
    })));
  }
  for handle in handles {
    handle.wait().await.unwrap();
  }
  tokio::time::sleep(Duration::from_millis(50)).await;

  let mut mirror = Mirror::default();
  while let Ok(batch) = rx.try_recv() {
    let outcome = mirror.apply_batch(&batch);
    assert_eq!(outcome.adds_skipped, 0);
    assert_eq!(outcome.updates_dropped, 0);
  }

  assert_eq!(mirror.len(), 32 * 5);
  assert_eq!(mirror.roots().count(), 32);
  for root in mirror.roots() {
    assert_eq!(root.children.len(), 4);
    assert_eq!(root.state, TaskState::Succeeded);
    for child in &root.children {
      let child = mirror.get(child).expect("child mirrored");
      assert_eq!(child.state, TaskState::Succeeded);
      assert_eq!(child.progress, 10);
    }
  }

  host.dispose();
}
