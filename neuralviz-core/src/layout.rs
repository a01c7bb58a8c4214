//! Force-directed layout
//!
//! Each [`ForceLayout::tick`] accumulates forces into node velocities and
//! then integrates positions:
//!
//! 1. Pairwise inverse-square repulsion, distance floored at `min_distance`
//! 2. Zero-rest-length springs along edges
//! 3. Gravity toward the origin
//! 4. Containment of agent children beyond `orbit_radius`
//! 5. Periodic jitter, damping, speed cap, position update
//!
//! Edge pulses advance on the same tick. Repulsion is all-pairs; session
//! graphs grow at human pace, so the quadratic pass is acceptable.

use crate::config::LayoutConfig;
use crate::graph::{GraphEdge, GraphNode, GraphStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Simulation constants
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    pub repulsion: f64,
    pub attraction: f64,
    pub gravity: f64,
    pub damping: f64,
    pub max_velocity: f64,
    pub min_distance: f64,
    pub orbit_radius: f64,
    pub containment: f64,
    /// Ticks between jitter kicks; 0 disables
    pub jitter_interval: u64,
    pub jitter_strength: f64,
    pub pulse_speed: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self::from(&LayoutConfig::default())
    }
}

impl From<&LayoutConfig> for LayoutParams {
    fn from(c: &LayoutConfig) -> Self {
        Self {
            repulsion: c.repulsion,
            attraction: c.attraction,
            gravity: c.gravity,
            damping: c.damping,
            max_velocity: c.max_velocity,
            min_distance: c.min_distance,
            orbit_radius: c.orbit_radius,
            containment: c.containment,
            jitter_interval: c.jitter_interval,
            jitter_strength: c.jitter_strength,
            pulse_speed: c.pulse_speed,
        }
    }
}

/// The layout engine. Sole writer of node positions and velocities.
#[derive(Debug)]
pub struct ForceLayout {
    params: LayoutParams,
    frame: u64,
    rng: StdRng,
}

impl ForceLayout {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            frame: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter, for tests and replays
    pub fn with_seed(params: LayoutParams, seed: u64) -> Self {
        Self {
            params,
            frame: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Ticks run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Advance the simulation one step. Returns the total kinetic energy
    /// (sum of squared speeds) after integration.
    pub fn tick(&mut self, graph: &mut GraphStore) -> f64 {
        let (nodes, edges, index) = graph.simulation_mut();
        advance_pulses(edges, self.params.pulse_speed);
        if nodes.is_empty() {
            return 0.0;
        }
        self.frame += 1;

        apply_repulsion(nodes, &self.params);
        apply_springs(nodes, edges, index, self.params.attraction);
        apply_gravity(nodes, self.params.gravity);
        apply_containment(nodes, index, &self.params);

        let jitter = self.params.jitter_interval > 0
            && self.frame % self.params.jitter_interval == 0;
        let mut energy = 0.0;
        for node in nodes.iter_mut() {
            if jitter {
                node.vx += (self.rng.gen::<f64>() - 0.5) * self.params.jitter_strength;
                node.vy += (self.rng.gen::<f64>() - 0.5) * self.params.jitter_strength;
            }

            node.vx *= self.params.damping;
            node.vy *= self.params.damping;

            let speed = node.vx.hypot(node.vy);
            if speed > self.params.max_velocity {
                node.vx = node.vx / speed * self.params.max_velocity;
                node.vy = node.vy / speed * self.params.max_velocity;
            }

            node.x += node.vx;
            node.y += node.vy;
            energy += node.vx * node.vx + node.vy * node.vy;
        }
        energy
    }
}

fn apply_repulsion(nodes: &mut [GraphNode], params: &LayoutParams) {
    let min_sq = params.min_distance * params.min_distance;
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let dx = nodes[j].x - nodes[i].x;
            let dy = nodes[j].y - nodes[i].y;
            let dist_sq = (dx * dx + dy * dy).max(min_sq);
            let dist = dist_sq.sqrt();
            let force = params.repulsion / dist_sq;
            let fx = dx / dist * force;
            let fy = dy / dist * force;

            nodes[i].vx -= fx;
            nodes[i].vy -= fy;
            nodes[j].vx += fx;
            nodes[j].vy += fy;
        }
    }
}

fn apply_springs(
    nodes: &mut [GraphNode],
    edges: &[GraphEdge],
    index: &HashMap<String, usize>,
    attraction: f64,
) {
    for edge in edges {
        let (Some(&s), Some(&t)) = (index.get(&edge.source_id), index.get(&edge.target_id)) else {
            continue;
        };
        let fx = (nodes[t].x - nodes[s].x) * attraction;
        let fy = (nodes[t].y - nodes[s].y) * attraction;

        nodes[s].vx += fx;
        nodes[s].vy += fy;
        nodes[t].vx -= fx;
        nodes[t].vy -= fy;
    }
}

fn apply_gravity(nodes: &mut [GraphNode], gravity: f64) {
    for node in nodes.iter_mut() {
        node.vx -= node.x * gravity;
        node.vy -= node.y * gravity;
    }
}

fn apply_containment(
    nodes: &mut [GraphNode],
    index: &HashMap<String, usize>,
    params: &LayoutParams,
) {
    for i in 0..nodes.len() {
        let Some(parent) = nodes[i]
            .parent_agent_id
            .as_ref()
            .and_then(|id| index.get(id))
            .copied()
        else {
            continue;
        };
        let dx = nodes[i].x - nodes[parent].x;
        let dy = nodes[i].y - nodes[parent].y;
        let dist = dx.hypot(dy);
        if dist > params.orbit_radius {
            let pull = (dist - params.orbit_radius) * params.containment;
            nodes[i].vx -= dx / dist * pull;
            nodes[i].vy -= dy / dist * pull;
        }
    }
}

/// Move active pulses along their edges; a finished traversal deactivates the edge.
fn advance_pulses(edges: &mut [GraphEdge], speed: f64) {
    for edge in edges.iter_mut().filter(|e| e.active) {
        edge.pulse_position += speed;
        if edge.pulse_position > 1.0 {
            edge.active = false;
            edge.pulse_position = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, NodeSpec};
    use crate::types::NodeKind;

    fn placed(id: &str, x: f64, y: f64, agent: Option<&str>) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            kind: NodeKind::Action,
            label: id.to_string(),
            content: String::new(),
            tool_name: None,
            session_id: "s".to_string(),
            timestamp: 0,
            parent_agent_id: agent.map(str::to_string),
            status: None,
            position: Some((x, y)),
        }
    }

    fn quiet() -> LayoutParams {
        LayoutParams {
            jitter_interval: 0,
            ..Default::default()
        }
    }

    fn separation(graph: &GraphStore) -> f64 {
        let a = graph.node("a").unwrap();
        let b = graph.node("b").unwrap();
        (b.x - a.x).hypot(b.y - a.y)
    }

    #[test]
    fn test_two_nodes_one_edge_converges() {
        let mut graph = GraphStore::default();
        graph.add_node(placed("a", -50.0, 0.0, None));
        graph.add_node(placed("b", 50.0, 0.0, None));
        graph.add_edge(EdgeSpec::new("a", "b"));

        let mut layout = ForceLayout::with_seed(quiet(), 7);
        for _ in 0..2000 {
            layout.tick(&mut graph);
        }
        let settled = separation(&graph);
        let mut energy = 0.0;
        for _ in 0..100 {
            energy = layout.tick(&mut graph);
        }

        // Repulsion balances spring plus gravity where s^3 = repulsion / gravity
        let expected = (800.0f64 / 0.02).cbrt();
        assert!((settled - expected).abs() < 0.01, "separation {}", settled);
        assert!((separation(&graph) - settled).abs() < 1e-6);
        assert!(energy < 1e-12);
    }

    #[test]
    fn test_coincident_nodes_stay_finite() {
        let mut graph = GraphStore::default();
        graph.add_node(placed("a", 0.0, 0.0, None));
        graph.add_node(placed("b", 0.0, 0.0, None));

        let mut layout = ForceLayout::with_seed(LayoutParams::default(), 1);
        for _ in 0..500 {
            layout.tick(&mut graph);
        }
        for node in graph.nodes() {
            assert!(node.x.is_finite() && node.y.is_finite());
        }
    }

    #[test]
    fn test_speed_is_capped() {
        let mut graph = GraphStore::default();
        graph.add_node(placed("a", 5000.0, 0.0, None));

        let mut layout = ForceLayout::with_seed(quiet(), 1);
        layout.tick(&mut graph);
        let node = graph.node("a").unwrap();
        assert!((node.vx.hypot(node.vy) - 4.0).abs() < 1e-9);
        assert_eq!(node.x, 4996.0);
    }

    #[test]
    fn test_containment_pulls_children_toward_agent() {
        let params = LayoutParams {
            repulsion: 0.0,
            gravity: 0.0,
            jitter_interval: 0,
            ..Default::default()
        };
        let mut graph = GraphStore::default();
        graph.add_node(placed("agent", 0.0, 0.0, None));
        graph.add_node(placed("near", 50.0, 0.0, Some("agent")));
        graph.add_node(placed("far", 0.0, 200.0, Some("agent")));

        let mut layout = ForceLayout::with_seed(params, 1);
        layout.tick(&mut graph);

        assert_eq!(graph.node("near").unwrap().vx, 0.0);
        let far = graph.node("far").unwrap();
        // overshoot 120 * 0.03, damped
        assert!((far.vy + 120.0 * 0.03 * 0.92).abs() < 1e-9);
        assert_eq!(graph.node("agent").unwrap().vy, 0.0);
    }

    #[test]
    fn test_jitter_is_seeded() {
        let run = || {
            let mut graph = GraphStore::default();
            graph.add_node(placed("a", 0.0, 0.0, None));
            let params = LayoutParams {
                jitter_interval: 1,
                gravity: 0.0,
                ..Default::default()
            };
            let mut layout = ForceLayout::with_seed(params, 42);
            layout.tick(&mut graph);
            graph.node("a").unwrap().position()
        };
        let first = run();
        assert_eq!(first, run());
        assert_ne!(first, (0.0, 0.0));
    }

    #[test]
    fn test_pulses_finish_once() {
        let mut graph = GraphStore::default();
        graph.add_node(placed("a", -50.0, 0.0, None));
        graph.add_node(placed("b", 50.0, 0.0, None));
        graph.add_edge(EdgeSpec::new("a", "b"));

        let params = LayoutParams {
            pulse_speed: 0.3,
            jitter_interval: 0,
            ..Default::default()
        };
        let mut layout = ForceLayout::with_seed(params, 1);
        for _ in 0..3 {
            layout.tick(&mut graph);
        }
        assert!(graph.edges()[0].active);
        layout.tick(&mut graph);
        assert!(!graph.edges()[0].active);
        assert_eq!(graph.edges()[0].pulse_position, 0.0);
        layout.tick(&mut graph);
        assert_eq!(graph.edges()[0].pulse_position, 0.0);
    }

    #[test]
    fn test_empty_graph_tick() {
        let mut graph = GraphStore::default();
        let mut layout = ForceLayout::new(LayoutParams::default());
        assert_eq!(layout.tick(&mut graph), 0.0);
        assert_eq!(layout.frame(), 0);
    }
}
