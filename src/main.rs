//! # Syndicate — Background Task Manager
//!
//! Runs the config-declared built-in tasks on a priority scheduler and
//! inspects what they left on disk.
//!
//! Usage:
//!   syndicate run                         # Run until Ctrl-C
//!   syndicate run --duration-secs 30      # Run for 30 seconds, then clean up
//!   syndicate discoveries --limit 5       # Newest discovery snapshot
//!   syndicate state <TASK_ID>             # Newest state snapshot of a task

mod builtin;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use syndicate_core::SyndicateConfig;
use syndicate_scheduler::discovery;
use syndicate_scheduler::snapshot::SnapshotStore;
use syndicate_scheduler::{BackgroundTaskManager, TaskEvent, TaskId};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "syndicate",
    version,
    about = "⏰ Syndicate — Background Task Manager"
)]
struct Cli {
    /// Config file (default: ~/.syndicate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the manager with the configured built-in tasks
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Print the newest discovery snapshot
    Discoveries {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Print the newest state snapshot of a task
    State { task_id: String },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&str>) -> Result<SyndicateConfig> {
    let mut config = match path {
        Some(p) => SyndicateConfig::load_from(&expand_path(p))?,
        None => SyndicateConfig::load()?,
    };
    let base = config.tasks.base_path.to_string_lossy().to_string();
    config.tasks.base_path = expand_path(&base);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "syndicate=debug,syndicate_scheduler=debug"
    } else {
        "syndicate=info,syndicate_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run { duration_secs } => run(config, duration_secs).await,
        Command::Discoveries { limit } => {
            match discovery::load_latest_snapshot(&config.tasks.discoveries_dir()).await? {
                Some((file, list)) => {
                    println!("📂 {} ({} discoveries)", file.display(), list.len());
                    let skip = list.len().saturating_sub(limit);
                    for d in &list[skip..] {
                        println!("{}", serde_json::to_string(d)?);
                    }
                }
                None => println!(
                    "No discoveries saved under {}",
                    config.tasks.discoveries_dir().display()
                ),
            }
            Ok(())
        }
        Command::State { task_id } => {
            let id: TaskId = task_id
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid task id '{task_id}': {e}"))?;
            let store = SnapshotStore::new(&config.tasks.states_dir());
            match store.load_latest(&id).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("No state saved for task {id}"),
            }
            Ok(())
        }
    }
}

async fn run(config: SyndicateConfig, duration_secs: Option<u64>) -> Result<()> {
    let manager = BackgroundTaskManager::new(config.tasks.clone());

    for entry in &config.builtin {
        let spec = builtin::build_spec(entry, &config.tasks.base_path)?;
        let id = manager.register_task(spec).await?;
        println!("   📅 {} → {}", entry.name, id);
    }
    if config.builtin.is_empty() {
        tracing::warn!("⚠️ No [[builtin]] tasks configured; the manager will idle");
    }

    let events = tokio::spawn(log_events(manager.subscribe()));

    println!("⏰ Syndicate v{}", env!("CARGO_PKG_VERSION"));
    println!("   📂 Data Dir:      {}", config.tasks.base_path.display());
    println!("   🔧 Max Concurrent: {}", config.tasks.max_concurrent_tasks);
    println!();
    manager.start().await;

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl-C received"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Ctrl-C received");
        }
    }

    manager.cleanup().await;
    let stats = manager.stats().await;
    println!(
        "📊 {} tasks, {} discoveries ({} idle, {} running, {} paused)",
        stats.total, stats.discoveries, stats.idle, stats.running, stats.paused
    );
    events.abort();
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<TaskEvent>) {
    loop {
        match rx.recv().await {
            Ok(TaskEvent::DiscoveryRecorded(d)) => {
                tracing::info!("💡 {} from '{}': {}", d.discovery_type, d.task_name, d.data);
            }
            Ok(TaskEvent::TaskFailed(f)) => {
                tracing::warn!("⚠️ '{}' failed: {}", f.name, f.error);
            }
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&event) {
                    tracing::debug!("📨 {json}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("⚠️ Event logger lagged, skipped {n} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
