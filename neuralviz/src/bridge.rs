//! neuralviz-bridge - forward local session logs to a remote neuralviz server
//!
//! Watches the local projects directory and posts every batch of new log
//! lines to the server's `/api/bridge` endpoint. Files are followed from
//! their current end, so history already on disk is not re-sent.

mod watcher;

use anyhow::{bail, Context, Result};
use clap::Parser;
use neuralviz_core::bridge::{BridgeBatch, SyncBridgeClient};
use neuralviz_core::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use watcher::{StartAt, TailOptions};

#[derive(Parser)]
#[command(name = "neuralviz-bridge")]
#[command(about = "Forward local session logs to a remote neuralviz server")]
#[command(version)]
struct Args {
    /// Server base URL (default: bridge.server_url, then http://localhost:4800)
    #[arg(long)]
    url: Option<String>,

    /// Bearer token for the server
    #[arg(long, env = "NEURAL_VIZ_API_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Directory of session logs to watch (default: ~/.claude/projects)
    #[arg(long)]
    projects: Option<PathBuf>,

    /// Also send lines already present in existing files
    #[arg(long)]
    from_start: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(url) = &args.url {
        config.bridge.server_url = url.clone();
    }
    if let Some(key) = args.key.as_ref().filter(|k| !k.is_empty()) {
        config.bridge.api_key = Some(key.clone());
    }
    if let Some(projects) = &args.projects {
        config.watcher.projects_path = Some(projects.clone());
    }

    let _log_guard =
        neuralviz_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let root = config.watcher.projects_dir();
    if !root.is_dir() {
        bail!("projects directory not found: {}", root.display());
    }

    let client =
        SyncBridgeClient::new(config.bridge.clone()).context("failed to create bridge client")?;

    println!("Watching {}", root.display());
    println!("Forwarding to {}", client.endpoint());
    if config.bridge.api_key.is_none() {
        println!("No API key set; the server must be in local mode");
    }
    println!("Press Ctrl+C to stop\n");
    tracing::info!(
        root = %root.display(),
        endpoint = %client.endpoint(),
        "neuralviz-bridge starting"
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let start = if args.from_start {
        StartAt::Beginning
    } else {
        StartAt::End
    };
    let options = TailOptions {
        existing: start,
        new_files: start,
        debounce: Duration::from_millis(config.watcher.debounce_ms),
    };

    let mut sent = 0usize;
    let mut failed = 0usize;
    watcher::run(&root, &options, &running, |session_id, lines| {
        let batch = BridgeBatch::from_lines(session_id, &lines);
        if batch.is_empty() {
            return;
        }
        match client.send(&batch) {
            Ok(response) => {
                sent += batch.messages.len();
                tracing::info!(
                    session_id,
                    records = batch.messages.len(),
                    processed = response.processed,
                    "Forwarded batch"
                );
            }
            Err(e) => {
                failed += batch.messages.len();
                tracing::warn!(session_id, error = %e, "Failed to forward batch");
                eprintln!("  {}: {}", session_id, e);
            }
        }
    })?;

    println!("\nStopped. Forwarded {} record(s), {} failed.", sent, failed);
    tracing::info!(sent, failed, "neuralviz-bridge stopped");
    Ok(())
}
