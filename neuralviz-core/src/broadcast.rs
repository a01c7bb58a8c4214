//! Viewer messages and the broadcast seam
//!
//! Everything the server tells viewers is a [`GraphMessage`]. On the wire a
//! message is `{"type": "<snake_case name>", "payload": {...}}` with camelCase
//! payload fields.
//!
//! Ingestion only depends on the [`Broadcaster`] trait; the server plugs in a
//! [`ChannelBroadcaster`] and tests plug in a [`MessageLog`].

use crate::graph::{GraphEdge, GraphNode, GraphStore};
use crate::types::{new_id, CanonicalEvent, NodeKind, NodeStatus};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

// ============================================
// Payloads
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAdd {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    pub status: NodeStatus,
    pub session_id: String,
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
}

impl From<&GraphNode> for NodeAdd {
    fn from(node: &GraphNode) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind,
            label: node.label.clone(),
            content: node.content.clone(),
            tool_name: node.tool_name.clone(),
            parent_agent_id: node.parent_agent_id.clone(),
            status: node.status,
            session_id: node.session_id.clone(),
            timestamp: node.timestamp,
            x: node.x,
            y: node.y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAdd {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub color: String,
}

impl From<&GraphEdge> for EdgeAdd {
    fn from(edge: &GraphEdge) -> Self {
        Self {
            id: edge.id.clone(),
            source_id: edge.source_id.clone(),
            target_id: edge.target_id.clone(),
            color: edge.color.clone(),
        }
    }
}

/// Entry for the textual audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub id: String,
    pub node_id: String,
    pub node_type: NodeKind,
    pub label: String,
    pub content: String,
    pub timestamp: i64,
}

impl From<&CanonicalEvent> for EventLog {
    fn from(event: &CanonicalEvent) -> Self {
        Self {
            id: new_id(),
            node_id: event.id.clone(),
            node_type: event.kind,
            label: event.label.clone(),
            content: event.content.clone(),
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

// ============================================
// Messages
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GraphMessage {
    NodeAdd(NodeAdd),
    EdgeAdd(EdgeAdd),
    EventLog(EventLog),
    NodeUpdate {
        id: String,
        status: NodeStatus,
    },
    SessionStart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Layout frame
    Positions {
        nodes: Vec<NodePosition>,
    },
    GraphCleared {},
}

impl GraphMessage {
    /// Wire name, as in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            GraphMessage::NodeAdd(_) => "node_add",
            GraphMessage::EdgeAdd(_) => "edge_add",
            GraphMessage::EventLog(_) => "event_log",
            GraphMessage::NodeUpdate { .. } => "node_update",
            GraphMessage::SessionStart { .. } => "session_start",
            GraphMessage::Positions { .. } => "positions",
            GraphMessage::GraphCleared {} => "graph_cleared",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Current position of every node
    pub fn positions(graph: &GraphStore) -> Self {
        GraphMessage::Positions {
            nodes: graph
                .nodes()
                .iter()
                .map(|n| NodePosition {
                    id: n.id.clone(),
                    x: n.x,
                    y: n.y,
                })
                .collect(),
        }
    }
}

/// Messages that bring a newly connected viewer up to date
pub fn replay(graph: &GraphStore) -> Vec<GraphMessage> {
    let mut messages: Vec<GraphMessage> = graph
        .nodes()
        .iter()
        .map(|n| GraphMessage::NodeAdd(n.into()))
        .collect();
    messages.extend(graph.edges().iter().map(|e| GraphMessage::EdgeAdd(e.into())));
    messages
}

// ============================================
// Broadcasters
// ============================================

/// Delivers a message to every current subscriber
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: GraphMessage);
}

/// Fan-out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<GraphMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: GraphMessage) {
        // No subscribers is not an error
        if self.tx.send(message).is_err() {
            tracing::trace!("No viewers connected");
        }
    }
}

/// Records every message, in order
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<GraphMessage>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<GraphMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<GraphMessage> {
        std::mem::take(
            &mut *self
                .messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(GraphMessage::kind).collect()
    }
}

impl Broadcaster for MessageLog {
    fn broadcast(&self, message: GraphMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, NodeSpec};
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let msg = GraphMessage::NodeUpdate {
            id: "n1".to_string(),
            status: NodeStatus::Completed,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "node_update", "payload": {"id": "n1", "status": "completed"}})
        );

        let msg = GraphMessage::SessionStart {
            session_id: "s".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "session_start", "payload": {"sessionId": "s"}})
        );

        let cleared = serde_json::to_value(GraphMessage::GraphCleared {}).unwrap();
        assert_eq!(cleared, json!({"type": "graph_cleared", "payload": {}}));
    }

    #[test]
    fn test_kind_matches_wire_type() {
        let msg = GraphMessage::EdgeAdd(EdgeAdd {
            id: "e".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            color: "#fff".to_string(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
        assert_eq!(value["payload"]["sourceId"], "a");
    }

    #[test]
    fn test_replay_covers_graph() {
        let mut graph = GraphStore::default();
        for (id, kind) in [("a", NodeKind::Prompt), ("b", NodeKind::Action)] {
            graph.add_node(NodeSpec {
                id: id.to_string(),
                kind,
                label: id.to_string(),
                content: String::new(),
                tool_name: None,
                session_id: "s".to_string(),
                timestamp: 0,
                parent_agent_id: None,
                status: None,
                position: None,
            });
        }
        graph.add_edge(EdgeSpec::new("a", "b"));

        let kinds: Vec<_> = replay(&graph).iter().map(GraphMessage::kind).collect();
        assert_eq!(kinds, vec!["node_add", "node_add", "edge_add"]);

        match GraphMessage::positions(&graph) {
            GraphMessage::Positions { nodes } => assert_eq!(nodes.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_channel_without_subscribers() {
        let tx = ChannelBroadcaster::new(4);
        tx.broadcast(GraphMessage::GraphCleared {});
        let mut rx = tx.subscribe();
        assert_eq!(tx.subscriber_count(), 1);
        tx.broadcast(GraphMessage::GraphCleared {});
        assert_eq!(rx.try_recv().unwrap(), GraphMessage::GraphCleared {});
    }

    #[test]
    fn test_message_log_take() {
        let log = MessageLog::new();
        log.broadcast(GraphMessage::GraphCleared {});
        assert_eq!(log.kinds(), vec!["graph_cleared"]);
        assert_eq!(log.take().len(), 1);
        assert!(log.messages().is_empty());
    }
}
