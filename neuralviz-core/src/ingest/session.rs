//! Per-session parsing state

use std::collections::HashMap;

/// Cross-event memory for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Most recently created node, of any kind
    pub last_node_id: Option<String>,
    /// Agent node whose subgraph is open, if any
    pub current_agent_id: Option<String>,
    /// Most recent prompt or thought; new actions branch from it
    pub last_anchor_id: Option<String>,
    /// Most recent action still waiting on its result
    pub last_action_id: Option<String>,
    /// Log tool-use id -> the action it created, for correlating log tool results
    pub tool_calls: HashMap<String, ToolCall>,
}

/// An action node created from a logged tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub node_id: String,
    pub tool_name: Option<String>,
}

impl SessionState {
    /// Parent for fan-out events: the anchor, else the last node
    pub fn fan_out_parent(&self) -> Option<String> {
        self.last_anchor_id
            .clone()
            .or_else(|| self.last_node_id.clone())
    }

    /// Parent for results: the pending action, else the last node
    pub fn result_parent(&self) -> Option<String> {
        self.last_action_id
            .clone()
            .or_else(|| self.last_node_id.clone())
    }
}

/// Session id -> state. Entries are created lazily and never removed.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, SessionState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `session_id`, creating it if needed. The flag is true on creation.
    pub fn get_or_create(&mut self, session_id: &str) -> (&mut SessionState, bool) {
        let created = !self.sessions.contains_key(session_id);
        let state = self.sessions.entry(session_id.to_string()).or_default();
        (state, created)
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
