//! Core domain types for neuralviz
//!
//! These types describe the canonical event that every raw payload is
//! normalized into, independent of whether it arrived through a push hook,
//! a tailed session log, or a remote bridge.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One continuous agent/user interaction, keyed by a stable session id |
//! | **Anchor** | The most recent prompt or thought in a session; new actions branch from it |
//! | **Agent context** | Events between a subagent spawn and its completion |
//! | **Canonical event** | The normalized, kind-tagged record produced from any raw payload |
//! | **Fan-out** | Several children branching from one parent instead of chaining |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session id used when a payload does not carry one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

// ============================================
// Kinds
// ============================================

/// What a graph node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Human input
    Prompt,
    /// Assistant reasoning or a notification
    Thought,
    /// A tool invocation
    Action,
    /// A spawned subagent
    Agent,
    /// A tool result or a stop
    Result,
    /// A failed tool call
    Error,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Prompt,
        NodeKind::Thought,
        NodeKind::Action,
        NodeKind::Agent,
        NodeKind::Result,
        NodeKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "prompt",
            NodeKind::Thought => "thought",
            NodeKind::Action => "action",
            NodeKind::Agent => "agent",
            NodeKind::Result => "result",
            NodeKind::Error => "error",
        }
    }

    /// Display color; edges take the color of their target's kind
    pub fn color(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "#bb86fc",
            NodeKind::Thought => "#00d4ff",
            NodeKind::Action => "#00ff88",
            NodeKind::Agent => "#ff9800",
            NodeKind::Result => "#ff4081",
            NodeKind::Error => "#ff1744",
        }
    }

    /// Base radius in layout units
    pub fn radius(&self) -> f64 {
        match self {
            NodeKind::Prompt => 12.0,
            NodeKind::Thought => 3.0,
            NodeKind::Action => 8.0,
            NodeKind::Agent => 22.0,
            NodeKind::Result => 6.0,
            NodeKind::Error => 7.0,
        }
    }

    /// Status a freshly created node of this kind starts in
    pub fn initial_status(&self) -> NodeStatus {
        match self {
            NodeKind::Result | NodeKind::Error => NodeStatus::Completed,
            _ => NodeStatus::Active,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(NodeKind::Prompt),
            "thought" => Ok(NodeKind::Thought),
            "action" => Ok(NodeKind::Action),
            "agent" => Ok(NodeKind::Agent),
            "result" => Ok(NodeKind::Result),
            "error" => Ok(NodeKind::Error),
            _ => Err(format!("unknown node kind: {}", s)),
        }
    }
}

/// Where a raw payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Push-style webhook
    Hook,
    /// Locally tailed session log
    Watcher,
    /// Session-log lines forwarded by a remote bridge
    Bridge,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Hook => "hook",
            SourceKind::Watcher => "watcher",
            SourceKind::Bridge => "bridge",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Active,
    Completed,
    Pending,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Completed => "completed",
            NodeStatus::Pending => "pending",
        }
    }
}

// ============================================
// Canonical Event
// ============================================

/// The normalized record produced from any raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Generated at normalization time
    pub id: String,
    pub session_id: String,
    pub source: SourceKind,
    pub kind: NodeKind,
    pub label: String,
    /// Truncated to the configured maximum
    pub content: String,
    /// Only set for tool-related events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Agent subgraph this event belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    /// Node this event causally follows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<String>,
    /// Earlier node (action or agent) that this event marks as completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completes: Option<String>,
}

impl CanonicalEvent {
    /// Timestamp as a UTC datetime, if representable
    pub fn emitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Generate an opaque unique id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncate `text` to at most `max` characters, appending [`ELLIPSIS`] when cut.
///
/// Counts Unicode scalar values, so multi-byte characters are never split.
/// Truncating an already-truncated string at the same `max` returns it unchanged.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
    }
}
