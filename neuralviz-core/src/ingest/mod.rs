//! Ingestion layer: raw payloads in, graph mutations and viewer messages out
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │  push hooks  │ ──► │                   │ ──► │  GraphStore  │
//! │ session logs │     │ IngestCoordinator │     └──────────────┘
//! │ bridge batch │ ──► │                   │ ──► ┌──────────────┐
//! └──────────────┘     └───────────────────┘     │ Broadcaster  │
//!                            │                   └──────────────┘
//!                            ▼
//!                 ┌──────────────────────┐
//!                 │ Normalizer           │
//!                 │  + SessionTracker    │
//!                 └──────────────────────┘
//! ```
//!
//! ## Locking
//!
//! The coordinator holds the session tracker behind one mutex and shares
//! the graph store with the layout loop behind another. Ingestion always
//! takes the tracker lock first and keeps it while mutating the graph, so
//! events of one session reach the graph in the order they were normalized.
//! The layout loop only ever takes the graph lock.

pub mod hook;
pub mod log_record;
pub mod normalizer;
pub mod session;
pub mod tail;
pub mod tools;

pub use hook::{HookEvent, HookKind, HookPayload, ToolOutcome};
pub use log_record::{LogMessage, LogRole, Segment};
pub use normalizer::Normalizer;
pub use session::{SessionState, SessionTracker};
pub use tail::LogTailer;
pub use tools::ToolInput;

use crate::bridge::BridgeBatch;
use crate::broadcast::{Broadcaster, EdgeAdd, EventLog, GraphMessage, NodeAdd};
use crate::error::Result;
use crate::graph::{EdgeSpec, GraphSnapshot, GraphStore, NodeSpec, NodeUpdate};
use crate::types::{CanonicalEvent, SourceKind};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Graph store shared between ingestion and the layout loop
pub type SharedGraph = Arc<Mutex<GraphStore>>;

/// Lock a shared graph, recovering from a poisoned lock
pub fn lock_graph(graph: &SharedGraph) -> MutexGuard<'_, GraphStore> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub events: u64,
    pub skipped_lines: u64,
    /// Edges dropped because an endpoint was missing
    pub dropped_edges: u64,
}

/// Runs every raw payload through normalization, the graph store and the broadcaster.
pub struct IngestCoordinator<B: Broadcaster> {
    tracker: Mutex<SessionTracker>,
    graph: SharedGraph,
    broadcaster: B,
    normalizer: Normalizer,
    events: AtomicU64,
    skipped_lines: AtomicU64,
}

impl<B: Broadcaster> IngestCoordinator<B> {
    pub fn new(normalizer: Normalizer, graph: SharedGraph, broadcaster: B) -> Self {
        Self {
            tracker: Mutex::new(SessionTracker::new()),
            graph,
            broadcaster,
            normalizer,
            events: AtomicU64::new(0),
            skipped_lines: AtomicU64::new(0),
        }
    }

    /// Handle a push-hook payload.
    ///
    /// Fails only when `payload` is not a JSON object.
    pub fn handle_push_event(&self, discriminator: &str, payload: &Value) -> Result<CanonicalEvent> {
        let payload = HookPayload::from_json(discriminator, payload)?;

        let mut tracker = self.lock_tracker();
        let created = tracker.get(&payload.session_id).is_none();
        let event = self.normalizer.normalize_hook(&payload, &mut tracker);
        self.publish(&event, created);
        drop(tracker);

        tracing::debug!(
            session_id = %event.session_id,
            hook = %HookKind::parse(discriminator),
            kind = %event.kind,
            "Hook event ingested"
        );
        Ok(event)
    }

    /// Handle one raw session-log line. `None` for unparsable or skipped records.
    pub fn handle_log_line(
        &self,
        session_id: &str,
        raw_line: &str,
        source: SourceKind,
    ) -> Option<CanonicalEvent> {
        match LogMessage::parse_line(raw_line) {
            Some(message) => self.handle_log_message(session_id, &message, source),
            None => {
                if !raw_line.trim().is_empty() {
                    self.skipped_lines.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(session_id, "Skipping unparsable log line");
                }
                None
            }
        }
    }

    /// Handle an already-decoded session-log record
    pub fn handle_log_value(
        &self,
        session_id: &str,
        record: &Value,
        source: SourceKind,
    ) -> Option<CanonicalEvent> {
        match LogMessage::from_value(record) {
            Some(message) => self.handle_log_message(session_id, &message, source),
            None => {
                self.skipped_lines.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Handle a bridge batch. Returns how many records produced events.
    pub fn handle_bridge_batch(&self, batch: &BridgeBatch) -> usize {
        let processed = batch
            .messages
            .iter()
            .filter_map(|record| self.handle_log_value(&batch.session_id, record, SourceKind::Bridge))
            .count();
        tracing::debug!(
            session_id = %batch.session_id,
            received = batch.messages.len(),
            processed,
            "Bridge batch ingested"
        );
        processed
    }

    fn handle_log_message(
        &self,
        session_id: &str,
        message: &LogMessage,
        source: SourceKind,
    ) -> Option<CanonicalEvent> {
        let mut tracker = self.lock_tracker();
        let created = tracker.get(session_id).is_none();
        let event = self
            .normalizer
            .normalize_log(session_id, message, source, &mut tracker)?;
        self.publish(&event, created);
        Some(event)
    }

    /// Apply an event to the graph and tell viewers.
    ///
    /// Order: `session_start` (first event only), `node_add`, `edge_add`,
    /// `event_log`, then `node_update` for a completed node.
    fn publish(&self, event: &CanonicalEvent, new_session: bool) {
        self.events.fetch_add(1, Ordering::Relaxed);
        if new_session {
            tracing::info!(session_id = %event.session_id, source = %event.source, "New session");
            self.broadcaster.broadcast(GraphMessage::SessionStart {
                session_id: event.session_id.clone(),
            });
        }

        let mut graph = lock_graph(&self.graph);
        if !graph.add_node(NodeSpec::from(event)) {
            return;
        }
        let edge = event
            .parent_node_id
            .as_ref()
            .and_then(|parent| graph.add_edge(EdgeSpec::new(parent.clone(), event.id.clone())));

        if let Some(node) = graph.node(&event.id) {
            self.broadcaster
                .broadcast(GraphMessage::NodeAdd(NodeAdd::from(node)));
        }
        if let Some(edge) = &edge {
            self.broadcaster
                .broadcast(GraphMessage::EdgeAdd(EdgeAdd::from(edge)));
        }
        self.broadcaster
            .broadcast(GraphMessage::EventLog(EventLog::from(event)));

        if let Some(done) = &event.completes {
            if let Some(node) = graph.update_node(done, &NodeUpdate::completed()) {
                let message = GraphMessage::NodeUpdate {
                    id: node.id.clone(),
                    status: node.status,
                };
                self.broadcaster.broadcast(message);
            }
        }
    }

    /// Empty the graph. Session state is kept.
    pub fn clear(&self) {
        let _tracker = self.lock_tracker();
        lock_graph(&self.graph).clear();
        self.broadcaster.broadcast(GraphMessage::GraphCleared {});
        tracing::info!("Graph cleared");
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        lock_graph(&self.graph).snapshot()
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn session_count(&self) -> usize {
        self.lock_tracker().len()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            events: self.events.load(Ordering::Relaxed),
            skipped_lines: self.skipped_lines.load(Ordering::Relaxed),
            dropped_edges: lock_graph(&self.graph).dropped_edges(),
        }
    }

    fn lock_tracker(&self) -> MutexGuard<'_, SessionTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
