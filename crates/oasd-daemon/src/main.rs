//! The `oasd` binary: host tick loop driving the synchronization engine.
//!
//! Ticks the scheduler on a fixed cadence and dispatches download requests
//! promptly whenever the store changes between ticks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;

use oasd_core::config;
use oasd_core::engine::SyncEngine;
use oasd_core::logging;
use oasd_core::scheduler::Scheduler;
use oasd_core::store::{DirStore, StateStore};

#[derive(Parser, Debug)]
#[command(name = "oasd", version, about = "Onboard asset synchronization daemon")]
struct Args {
    /// Tick interval in milliseconds (the host control cycle cadence).
    #[arg(long, default_value_t = 20)]
    interval_ms: u64,

    /// Override the settings store directory from the config file.
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Run one full synchronization pass and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr");
    }

    let cfg = config::load_or_init().context("load config")?;
    let settings_dir = args
        .settings_dir
        .unwrap_or_else(|| cfg.paths.settings_dir.clone());

    let store: Arc<dyn StateStore> = Arc::new(
        DirStore::open(&settings_dir)
            .with_context(|| format!("open settings store at {}", settings_dir.display()))?,
    );
    let storage: Arc<dyn StateStore> = Arc::new(
        DirStore::open(&cfg.paths.storage_dir)
            .with_context(|| format!("open storage store at {}", cfg.paths.storage_dir.display()))?,
    );

    let engine = SyncEngine::new(cfg, Arc::clone(&store), storage).context("build engine")?;

    if args.once {
        tracing::info!("running a single synchronization pass");
        let once_engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            once_engine.models().update_models(true);
            once_engine.themes().update_themes();
        })
        .await
        .context("synchronization pass")?;
        return Ok(());
    }

    let mut scheduler = Scheduler::new(Arc::clone(&engine));
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut changes = store.changes();

    tracing::info!("oasd running; settings store at {}", settings_dir.display());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.tick(Local::now());
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break; // store gone; nothing left to drive
                }
                engine.poll_downloads();
            }
        }
    }
    Ok(())
}
