//! livewatch daemon - tracks when streaming accounts go live
//!
//! Periodically queries each configured account's platform, records live
//! sessions in a local SQLite database and keeps the latest status of every
//! account.
//!
//! # Usage
//!
//! ```bash
//! # Run the scanner in the foreground (default command)
//! livewatchd --config ~/.config/livewatch/config.toml run
//!
//! # Query one target right now, without touching the database
//! livewatchd check alice
//!
//! # Inspect what has been recorded
//! livewatchd targets
//! livewatchd history alice --limit 10
//! livewatchd stats alice
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use livewatch_platforms::{Adapter, StatusSource};
use livewatchd::avatar::AvatarCache;
use livewatchd::config::{config_path, Config};
use livewatchd::scheduler::{adapter_sources, ScanSettings, Scheduler};
use livewatchd::service::{StatusService, DEFAULT_HISTORY_LIMIT};
use livewatchd::store::{SessionStore, SqliteStore};
use livewatchd::tracker::LivenessTracker;

/// livewatch daemon - live-status tracker for streaming accounts
#[derive(Parser, Debug)]
#[command(name = "livewatchd", version, about)]
struct Args {
    /// Config file (defaults to $LIVEWATCH_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan all targets until interrupted
    Run,
    /// Fetch one target's status now and print it
    Check {
        /// Target id from the config
        target: String,
    },
    /// Print the recorded status of every target
    Targets,
    /// Print a target's recent sessions
    History {
        target: String,
        /// Number of sessions to show
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Print a target's session statistics
    Stats { target: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let command = args.command.unwrap_or(Command::Run);
    let path = config_path(args.config)?;
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        match command {
            Command::Run => run_daemon(config).await,
            Command::Check { target } => check(&config, &target).await,
            Command::Targets => {
                let service = open_service(&config).await?;
                print_json(&service.list_targets().await)
            }
            Command::History { target, limit } => {
                let service = open_service(&config).await?;
                print_json(&service.history(&target, limit).await?)
            }
            Command::Stats { target } => {
                let service = open_service(&config).await?;
                print_json(&service.stats(&target).await?)
            }
        }
    })
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("livewatchd=info".parse()?)
                .add_directive("livewatch_platforms=info".parse()?)
                .add_directive("livewatch_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_daemon(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        targets = config.targets.len(),
        "livewatch daemon starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let tracker = open_tracker(&config).await?;

    let sources =
        adapter_sources(&config.targets).context("Failed to build platform adapters")?;
    let scheduler = Arc::new(Scheduler::new(
        &config.targets,
        sources,
        Arc::clone(&tracker),
        ScanSettings::from(&config.settings),
    ));
    let _scheduler_handle = scheduler.spawn(cancel_token.clone());

    let avatar_handle = match &config.settings.avatar_dir {
        Some(dir) => match AvatarCache::new(dir.clone(), &config.targets, Arc::clone(&tracker)) {
            Ok(cache) => {
                let loaded = cache.load_local().await;
                info!(dir = %dir.display(), loaded, "Avatar cache started");
                Some(Arc::new(cache).spawn(cancel_token.clone()))
            }
            Err(e) => {
                warn!(error = %e, "Avatar cache disabled");
                None
            }
        },
        None => None,
    };

    cancel_token.cancelled().await;

    scheduler.shutdown().await;
    if let Some(handle) = avatar_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Avatar task failed");
        }
    }

    info!("livewatch daemon stopped");
    Ok(())
}

async fn check(config: &Config, id: &str) -> Result<()> {
    let target = config
        .target(id)
        .ok_or_else(|| anyhow!("unknown target '{id}'"))?;
    let adapter =
        Adapter::for_platform(target.platform).context("Failed to build platform adapter")?;

    let snapshot = adapter
        .fetch(&target.room_id, &CancellationToken::new())
        .await
        .with_context(|| format!("Failed to fetch status for '{id}'"))?;
    print_json(&snapshot)
}

async fn open_tracker(config: &Config) -> Result<Arc<LivenessTracker>> {
    let db_path = config.settings.database_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!(database = %db_path.display(), "Session store opened");

    let store: Arc<dyn SessionStore> = Arc::new(store);
    let tracker = Arc::new(LivenessTracker::new(&config.targets, store));
    let report = tracker.restore().await;
    info!(
        adopted = report.adopted_sessions,
        cached = report.cached_rows,
        errors = report.errors,
        "Tracker state restored"
    );
    Ok(tracker)
}

async fn open_service(config: &Config) -> Result<StatusService> {
    let tracker = open_tracker(config).await?;
    Ok(StatusService::new(tracker, &config.targets))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{text}");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
