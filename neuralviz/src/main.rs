//! neuralviz - live causal graph of AI agent sessions
//!
//! Accepts push hooks and bridge batches over HTTP, tails local session logs,
//! runs the force layout and streams everything to WebSocket viewers.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/neuralviz/neuralviz.log (~/.local/state/neuralviz/neuralviz.log)
//! - Config: $XDG_CONFIG_HOME/neuralviz/config.toml (~/.config/neuralviz/config.toml)

mod auth;
mod server;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use neuralviz_core::config::DeployMode;
use neuralviz_core::graph::placement::BranchPlacement;
use neuralviz_core::graph::GraphStore;
use neuralviz_core::ingest::Normalizer;
use neuralviz_core::{ChannelBroadcaster, Config, IngestCoordinator, SourceKind};
use server::{AppState, Coordinator};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use watcher::{StartAt, TailOptions};

#[derive(Parser)]
#[command(name = "neuralviz")]
#[command(about = "Live causal graph of AI agent sessions")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/neuralviz/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory of session logs to watch (default: ~/.claude/projects)
    #[arg(long)]
    projects: Option<PathBuf>,

    /// Disable the local session-log watcher
    #[arg(long)]
    no_watch: bool,

    /// Serve the built viewer from this directory
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::load_from(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            config.apply_env();
            config
        }
        None => Config::load().context("failed to load configuration")?,
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(projects) = &args.projects {
        config.watcher.projects_path = Some(projects.clone());
    }
    if args.no_watch {
        config.watcher.enabled = false;
    }
    if let Some(dir) = &args.static_dir {
        config.server.static_dir = Some(dir.clone());
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let _log_guard =
        neuralviz_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(
        mode = %config.server.deploy_mode,
        port = config.server.port,
        "neuralviz starting"
    );

    let graph = Arc::new(Mutex::new(GraphStore::new(Box::new(BranchPlacement::from(
        &config.placement,
    )))));
    let coordinator: Arc<Coordinator> = Arc::new(IngestCoordinator::new(
        Normalizer::new(&config.content),
        graph,
        ChannelBroadcaster::new(config.server.channel_capacity),
    ));

    let layout_task = tokio::spawn(server::run_layout(
        coordinator.clone(),
        config.layout.clone(),
    ));

    let running = Arc::new(AtomicBool::new(true));
    let watcher_thread = spawn_watcher(&config, coordinator.clone(), running.clone())?;

    let state = AppState::new(coordinator.clone(), &config.server);
    let app = server::router(state, config.server.static_dir.as_deref());
    let result = server::serve(&config.server, app, shutdown_signal()).await;

    running.store(false, Ordering::SeqCst);
    layout_task.abort();
    if let Some(handle) = watcher_thread {
        if handle.join().is_err() {
            tracing::error!("Watcher thread panicked");
        }
    }

    let stats = coordinator.stats();
    tracing::info!(
        events = stats.events,
        skipped_lines = stats.skipped_lines,
        dropped_edges = stats.dropped_edges,
        "neuralviz stopped"
    );
    result
}

/// Tail local session logs into the graph (local mode only)
fn spawn_watcher(
    config: &Config,
    coordinator: Arc<Coordinator>,
    running: Arc<AtomicBool>,
) -> Result<Option<thread::JoinHandle<()>>> {
    if config.server.deploy_mode == DeployMode::Remote {
        tracing::info!("Remote mode, local watcher disabled");
        return Ok(None);
    }
    if !config.watcher.enabled {
        tracing::info!("Local watcher disabled");
        return Ok(None);
    }

    let root = config.watcher.projects_dir();
    if !root.is_dir() {
        tracing::warn!(path = %root.display(), "Projects directory not found, watcher not started");
        return Ok(None);
    }

    let options = TailOptions {
        existing: if config.watcher.replay_existing {
            StartAt::Beginning
        } else {
            StartAt::End
        },
        new_files: StartAt::Beginning,
        debounce: Duration::from_millis(config.watcher.debounce_ms),
    };

    let handle = thread::Builder::new()
        .name("session-watcher".to_string())
        .spawn(move || {
            let result = watcher::run(&root, &options, &running, |session_id, lines| {
                for line in &lines {
                    coordinator.handle_log_line(session_id, line, SourceKind::Watcher);
                }
            });
            if let Err(e) = result {
                tracing::error!(error = %format!("{:#}", e), "Session watcher failed");
            }
        })
        .context("failed to spawn watcher thread")?;
    Ok(Some(handle))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested");
}
