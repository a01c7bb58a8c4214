//! neuralviz-debug-log - session-log normalization debugging tool
//!
//! Runs session log files through the same normalizer and graph store the
//! server uses, and prints the resulting canonical events (or viewer
//! messages) as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use neuralviz_core::broadcast::MessageLog;
use neuralviz_core::graph::GraphStore;
use neuralviz_core::ingest::tail::session_id_from_path;
use neuralviz_core::ingest::{lock_graph, IngestCoordinator, Normalizer};
use neuralviz_core::{CanonicalEvent, GraphMessage, SourceKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(name = "neuralviz-debug-log")]
#[command(about = "Normalize session logs and output canonical events")]
#[command(version)]
struct Args {
    /// Path(s) to JSONL file(s) to normalize
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Session id to use (default: file name without .jsonl)
    #[arg(long)]
    session: Option<String>,

    /// Output viewer messages instead of canonical events
    #[arg(long)]
    messages: bool,

    /// Show only summary statistics
    #[arg(long)]
    summary: bool,

    /// Compact JSON output (default: pretty)
    #[arg(long)]
    compact: bool,
}

#[derive(Serialize)]
struct DebugOutput {
    file: String,
    session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<CanonicalEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<GraphMessage>,
    stats: Stats,
}

#[derive(Serialize)]
struct Stats {
    lines: usize,
    events: usize,
    skipped: usize,
    by_kind: BTreeMap<&'static str, usize>,
    /// Graph totals after this file, across every file so far
    nodes: usize,
    edges: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let coordinator = IngestCoordinator::new(
        Normalizer::default(),
        Arc::new(Mutex::new(GraphStore::default())),
        MessageLog::new(),
    );

    let mut outputs = Vec::new();
    for file in &args.files {
        if !file.exists() {
            eprintln!("Warning: File not found: {}", file.display());
            continue;
        }
        match normalize_file(&args, &coordinator, file) {
            Ok(output) => outputs.push(output),
            Err(e) => eprintln!("Warning: Failed to read {}: {:#}", file.display(), e),
        }
    }

    if outputs.is_empty() {
        anyhow::bail!("No files were successfully normalized");
    }

    // Single object for one file, array for multiple
    let json = match (outputs.len() == 1, args.compact) {
        (true, true) => serde_json::to_string(&outputs[0])?,
        (true, false) => serde_json::to_string_pretty(&outputs[0])?,
        (false, true) => serde_json::to_string(&outputs)?,
        (false, false) => serde_json::to_string_pretty(&outputs)?,
    };
    println!("{}", json);

    Ok(())
}

fn normalize_file(
    args: &Args,
    coordinator: &IngestCoordinator<MessageLog>,
    file: &Path,
) -> Result<DebugOutput> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read: {}", file.display()))?;
    let session_id = args
        .session
        .clone()
        .or_else(|| session_id_from_path(file))
        .unwrap_or_else(|| neuralviz_core::DEFAULT_SESSION_ID.to_string());

    let mut lines = 0;
    let mut events = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        lines += 1;
        if let Some(event) = coordinator.handle_log_line(&session_id, line, SourceKind::Watcher) {
            events.push(event);
        }
    }
    let messages = coordinator.broadcaster().take();

    let mut by_kind = BTreeMap::new();
    for event in &events {
        *by_kind.entry(event.kind.as_str()).or_insert(0) += 1;
    }
    let (nodes, edges) = {
        let graph = lock_graph(coordinator.graph());
        (graph.node_count(), graph.edge_count())
    };
    let stats = Stats {
        lines,
        events: events.len(),
        skipped: lines - events.len(),
        by_kind,
        nodes,
        edges,
    };

    let (events, messages) = match (args.summary, args.messages) {
        (true, _) => (Vec::new(), Vec::new()),
        (false, true) => (Vec::new(), messages),
        (false, false) => (events, Vec::new()),
    };

    Ok(DebugOutput {
        file: file.display().to_string(),
        session_id,
        events,
        messages,
        stats,
    })
}
