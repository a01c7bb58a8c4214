//! In-memory session graph
//!
//! The [`GraphStore`] is the authoritative set of nodes and edges. It only
//! grows, except through [`GraphStore::clear`]. Node positions start from a
//! [`PlacementPolicy`] and are then owned by the layout engine.

pub mod placement;

pub use placement::{BranchPlacement, PlacementPolicy};

use crate::types::{new_id, now_millis, CanonicalEvent, NodeKind, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

// ============================================
// Node and edge records
// ============================================

/// A node plus its simulation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub session_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    pub status: NodeStatus,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub color: String,
    /// Edges leaving this node
    pub connection_count: u32,
    /// Milliseconds on the store clock when the node was added
    pub birth_time: f64,
    /// Position still comes from `PlacementPolicy::initial`
    #[serde(skip)]
    pub placeholder: bool,
}

impl GraphNode {
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub color: String,
    /// Traveling indicator, in [0, 1]
    pub pulse_position: f64,
    /// True until the pulse finishes its first traversal
    pub active: bool,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// What a caller supplies to add a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub content: String,
    pub tool_name: Option<String>,
    pub session_id: String,
    pub timestamp: i64,
    pub parent_agent_id: Option<String>,
    /// Defaults to the kind's initial status
    pub status: Option<NodeStatus>,
    /// Explicit position; skips placement
    pub position: Option<(f64, f64)>,
}

impl From<&CanonicalEvent> for NodeSpec {
    fn from(event: &CanonicalEvent) -> Self {
        Self {
            id: event.id.clone(),
            kind: event.kind,
            label: event.label.clone(),
            content: event.content.clone(),
            tool_name: event.tool_name.clone(),
            session_id: event.session_id.clone(),
            timestamp: event.timestamp,
            parent_agent_id: event.parent_agent_id.clone(),
            status: None,
            position: None,
        }
    }
}

/// What a caller supplies to add an edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    /// Generated when absent
    pub id: Option<String>,
    pub source_id: String,
    pub target_id: String,
}

impl EdgeSpec {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            id: None,
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// Partial node update; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub status: Option<NodeStatus>,
    pub label: Option<String>,
    pub content: Option<String>,
}

impl NodeUpdate {
    pub fn completed() -> Self {
        Self {
            status: Some(NodeStatus::Completed),
            ..Default::default()
        }
    }
}

/// Serializable copy of the whole graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

// ============================================
// Store
// ============================================

#[derive(Debug)]
pub struct GraphStore {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    placement: Box<dyn PlacementPolicy>,
    clock: Instant,
    dropped_edges: u64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(Box::new(BranchPlacement::default()))
    }
}

impl GraphStore {
    pub fn new(placement: Box<dyn PlacementPolicy>) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            placement,
            clock: Instant::now(),
            dropped_edges: 0,
        }
    }

    /// Add a node. Returns false, leaving the store unchanged, if the id exists.
    pub fn add_node(&mut self, spec: NodeSpec) -> bool {
        if self.index.contains_key(&spec.id) {
            tracing::debug!(node_id = %spec.id, "Ignoring duplicate node");
            return false;
        }

        let ((x, y), placeholder) = match spec.position {
            Some(pos) => (pos, false),
            None => (self.placement.initial(self.nodes.len()), true),
        };

        let node = GraphNode {
            status: spec.status.unwrap_or_else(|| spec.kind.initial_status()),
            radius: spec.kind.radius(),
            color: spec.kind.color().to_string(),
            id: spec.id,
            kind: spec.kind,
            label: spec.label,
            content: spec.content,
            tool_name: spec.tool_name,
            session_id: spec.session_id,
            timestamp: spec.timestamp,
            parent_agent_id: spec.parent_agent_id,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            connection_count: 0,
            birth_time: self.clock.elapsed().as_secs_f64() * 1000.0,
            placeholder,
        };

        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Add an edge between two existing nodes.
    ///
    /// Returns `None` without changing anything when either endpoint is
    /// missing. A placeholder target is moved next to its source.
    pub fn add_edge(&mut self, spec: EdgeSpec) -> Option<GraphEdge> {
        let (source_idx, target_idx) =
            match (self.index.get(&spec.source_id), self.index.get(&spec.target_id)) {
                (Some(s), Some(t)) => (*s, *t),
                _ => {
                    self.dropped_edges += 1;
                    tracing::debug!(
                        source_id = %spec.source_id,
                        target_id = %spec.target_id,
                        "Dropping edge with missing endpoint"
                    );
                    return None;
                }
            };

        let edge = GraphEdge {
            id: spec.id.unwrap_or_else(new_id),
            color: self.nodes[target_idx].kind.color().to_string(),
            source_id: spec.source_id,
            target_id: spec.target_id,
            pulse_position: 0.0,
            active: true,
            created_at: now_millis(),
        };

        self.nodes[source_idx].connection_count += 1;

        if self.nodes[target_idx].placeholder {
            let siblings = self
                .edges
                .iter()
                .filter(|e| e.source_id == edge.source_id)
                .count()
                + 1;
            let (x, y) =
                self.placement
                    .branch(self.nodes[source_idx].position(), siblings - 1, siblings);
            let target = &mut self.nodes[target_idx];
            target.x = x;
            target.y = y;
            target.placeholder = false;
        }

        self.edges.push(edge.clone());
        Some(edge)
    }

    /// Merge `update` into a node. Returns the updated node, or `None` if absent.
    pub fn update_node(&mut self, id: &str, update: &NodeUpdate) -> Option<&GraphNode> {
        let idx = *self.index.get(id)?;
        let node = &mut self.nodes[idx];
        if let Some(status) = update.status {
            node.status = status;
        }
        if let Some(label) = &update.label {
            node.label = label.clone();
        }
        if let Some(content) = &update.content {
            node.content = content.clone();
        }
        Some(&*node)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|i| &self.nodes[*i])
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Edges with `id` as source or target
    pub fn edges_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source_id == id || e.target_id == id)
    }

    /// Nodes whose enclosing agent is `agent_id`
    pub fn agent_children<'a>(
        &'a self,
        agent_id: &'a str,
    ) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_agent_id.as_deref() == Some(agent_id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges dropped for a missing endpoint since creation
    pub fn dropped_edges(&self) -> u64 {
        self.dropped_edges
    }

    /// Remove every node and edge
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.edges.clear();
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Mutable access for the layout engine. Node order and ids must not change.
    pub fn simulation_mut(
        &mut self,
    ) -> (&mut [GraphNode], &mut [GraphEdge], &HashMap<String, usize>) {
        (
            self.nodes.as_mut_slice(),
            self.edges.as_mut_slice(),
            &self.index,
        )
    }
}
