mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tasktree_config::Config;
use tasktree_host::TaskHost;
use tasktree_mirror::Subscriber;
use tasktree_model::{OperationKind, TaskOperation};
use tasktree_runtime::{Session, TaskContext, TaskError, task_fn};
use tasktree_sync::ChannelSink;

/// Tasktree - hierarchical task tracking with batched progress sync
#[derive(Parser)]
#[command(name = "tasktree")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tasktree)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON config file (default: <data-dir>/config.json if present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a simulated install through the full sync pipeline and print the
  /// subscriber's mirror
  Demo {
    /// Number of download children under the install task
    #[arg(long, default_value_t = 3)]
    children: usize,

    /// Cancel the install after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Make the first download fail halfway
    #[arg(long)]
    fail: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tasktree"),
  };
  let config = load_config(cli.config.as_deref(), &data_dir)?;
  logging::init_logging(&config.log);

  match cli.command {
    Some(Commands::Demo {
      children,
      cancel_after_ms,
      fail,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_demo(config, children, cancel_after_ms, fail))?;
    }
    None => {
      println!("tasktree - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_config(explicit: Option<&Path>, data_dir: &Path) -> Result<Config> {
  let config = match explicit {
    Some(path) => Config::load(path).with_context(|| format!("failed to load config: {}", path.display()))?,
    None => {
      let default_path = data_dir.join("config.json");
      if default_path.exists() {
        Config::load(&default_path)
          .with_context(|| format!("failed to load config: {}", default_path.display()))?
      } else {
        Config::default()
      }
    }
  };
  config.validate().context("invalid config")?;
  Ok(config)
}

async fn run_demo(
  config: Config,
  children: usize,
  cancel_after_ms: Option<u64>,
  fail: bool,
) -> Result<()> {
  let host = Arc::new(TaskHost::new(Session::new(), config.sync.clone()));
  let subscriber = Subscriber::new(&config.mirror);
  let (sink, batches) = ChannelSink::channel();
  let snapshot = host.subscribe("cli", Arc::new(sink));
  let stop = CancellationToken::new();

  let drive = {
    let host = host.clone();
    let stop = stop.clone();
    let settle = config.sync.interval() * 2;
    async move {
      let handle = host.submit(
        task_fn("install", move |ctx| install(ctx, children, fail))
          .with_param(serde_json::json!({ "version": "1.20.1" })),
      );
      let root = handle.id().clone();

      if let Some(ms) = cancel_after_ms {
        let host = host.clone();
        let root = root.clone();
        tokio::spawn(async move {
          tokio::time::sleep(Duration::from_millis(ms)).await;
          host.operate(&TaskOperation::new(OperationKind::Cancel, root));
        });
      }

      match handle.wait().await {
        Ok(()) => eprintln!("Install {} succeeded", root),
        Err(e) => eprintln!("Install {} ended: {}", root, e),
      }

      // Give the pusher time to deliver the last window
      tokio::time::sleep(settle).await;
      stop.cancel();
    }
  };

  tokio::join!(subscriber.run(async move { snapshot }, batches, stop.clone()), drive);

  let view = subscriber.reconciler().read(|mirror| mirror.view());
  println!("{}", serde_json::to_string_pretty(&view)?);

  host.dispose();
  Ok(())
}

async fn install(ctx: TaskContext, children: usize, fail: bool) -> Result<(), TaskError> {
  ctx.set_total(children as u64);

  let downloads: Vec<_> = (0..children)
    .map(|i| {
      let fail = fail && i == 0;
      ctx.execute(
        task_fn(format!("download.{i}"), move |ctx| download(ctx, 8, fail))
          .with_param(serde_json::json!({ "file": format!("lib-{i}.jar") }))
          .with_from(format!("https://libraries.example.net/lib-{i}.jar"))
          .with_to(format!("libraries/lib-{i}.jar")),
      )
    })
    .collect();

  let mut first_error = None;
  for (done, download) in downloads.into_iter().enumerate() {
    if let Err(e) = download.wait().await {
      if first_error.is_none() {
        first_error = Some(e);
      }
    }
    ctx.update(done as u64 + 1, Some(children as u64), None);
  }

  match first_error {
    Some(e) => Err(e),
    None => {
      info!(task_id = %ctx.id(), "install finished");
      Ok(())
    }
  }
}

async fn download(ctx: TaskContext, chunks: u64, fail: bool) -> Result<(), TaskError> {
  const CHUNK: u64 = 64 * 1024;
  ctx.update(0, Some(chunks * CHUNK), Some("connecting"));

  for chunk in 0..chunks {
    ctx.checkpoint().await?;
    if fail && chunk == chunks / 2 {
      return Err(TaskError::msg("checksum mismatch"));
    }
    tokio::time::sleep(Duration::from_millis(40)).await;
    ctx.advance(CHUNK);
  }
  Ok(())
}
