//! Archetype influence graph.
//!
//! A small directed graph of named nodes, each carrying an intensity in
//! [0, 1]. Connections are declared per node and may be asymmetric.
//!
//! # Propagation
//!
//! [`ArchetypeGraph::update_intensity`] pushes influence exactly one hop:
//! every direct neighbor gains `source * propagation_factor`, and that gain
//! never propagates further. The graph may contain cycles, so this bound is
//! what keeps repeated updates from oscillating or exploding.
//!
//! # Harmonization
//!
//! [`ArchetypeGraph::harmonize_all`] pulls every node a fixed fraction of the
//! way toward the mean of the active nodes. Each pass scales every active
//! deviation by `1 - rate`, so variance shrinks monotonically.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::channels::clamp_unit;
use crate::config::GraphConfig;
use crate::error::{AffectError, AffectResult};

/// One archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeNode {
    pub id: String,
    pub intensity: f32,
    pub active: bool,
    /// Outgoing connections (ids this node influences).
    pub connections: BTreeSet<String>,
}

impl ArchetypeNode {
    pub fn new(id: impl Into<String>, intensity: f32) -> Self {
        Self {
            id: id.into(),
            intensity: clamp_unit(intensity),
            active: true,
            connections: BTreeSet::new(),
        }
    }

    pub fn with_connections<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if id != self.id {
                self.connections.insert(id);
            }
        }
        self
    }
}

/// Ids of the built-in archetype set.
pub mod ids {
    pub const SENTINEL: &str = "sentinel";
    pub const EXPLORER: &str = "explorer";
    pub const ARTISAN: &str = "artisan";
    pub const SAGE: &str = "sage";
    pub const COMPANION: &str = "companion";
    pub const DREAMER: &str = "dreamer";
}

/// The built-in six-node archetype set.
pub fn default_archetypes() -> Vec<ArchetypeNode> {
    use ids::*;
    vec![
        ArchetypeNode::new(SENTINEL, 0.4).with_connections([SAGE, COMPANION]),
        ArchetypeNode::new(EXPLORER, 0.5).with_connections([DREAMER, ARTISAN]),
        ArchetypeNode::new(ARTISAN, 0.5).with_connections([SAGE]),
        ArchetypeNode::new(SAGE, 0.6).with_connections([SENTINEL, EXPLORER]),
        ArchetypeNode::new(COMPANION, 0.5).with_connections([DREAMER]),
        ArchetypeNode::new(DREAMER, 0.3).with_connections([EXPLORER, COMPANION]),
    ]
}

/// Weighted influence graph of archetypes.
#[derive(Debug, Clone)]
pub struct ArchetypeGraph {
    /// Insertion order is the tie-break order for [`Self::get_most_active`].
    nodes: Vec<ArchetypeNode>,
    index: HashMap<String, usize>,
    /// Snapshot restored by [`Self::reset`].
    initial: Vec<ArchetypeNode>,
    propagation_factor: f32,
    harmonize_rate: f32,
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::with_defaults(&GraphConfig::default())
    }
}

impl ArchetypeGraph {
    /// A graph with the given nodes. Later duplicates of an id are ignored.
    pub fn new(nodes: Vec<ArchetypeNode>, config: &GraphConfig) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(nodes.len()),
            index: HashMap::new(),
            initial: Vec::new(),
            propagation_factor: config.propagation_factor,
            harmonize_rate: clamp_unit(config.harmonize_rate),
        };
        for node in nodes {
            graph.add_node(node);
        }
        graph.initial = graph.nodes.clone();
        graph
    }

    pub fn with_defaults(config: &GraphConfig) -> Self {
        Self::new(default_archetypes(), config)
    }

    /// Add a node. Returns `false` if the id already exists.
    pub fn add_node(&mut self, mut node: ArchetypeNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        node.intensity = clamp_unit(node.intensity);
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Declare a one-way connection `from → to`.
    pub fn connect(&mut self, from: &str, to: &str) -> AffectResult<()> {
        self.require(to)?;
        if from == to {
            return Ok(());
        }
        let node = self.node_mut(from)?;
        node.connections.insert(to.to_string());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ArchetypeNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn intensity(&self, id: &str) -> Option<f32> {
        self.get(id).map(|n| n.intensity)
    }

    pub fn nodes(&self) -> &[ArchetypeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> AffectResult<()> {
        self.node_mut(id)?.active = active;
        Ok(())
    }

    /// Set a node's intensity and push influence one hop to its neighbors.
    ///
    /// Neighbor gains are applied directly and never trigger their own
    /// propagation. Connections to ids missing from the graph are skipped.
    pub fn update_intensity(&mut self, id: &str, value: f32) -> AffectResult<()> {
        let source = clamp_unit(value);
        let idx = self.position(id)?;
        self.nodes[idx].intensity = source;

        let boost = source * self.propagation_factor;
        let neighbors: Vec<usize> = self.nodes[idx]
            .connections
            .iter()
            .filter_map(|n| self.index.get(n).copied())
            .collect();
        for n in neighbors {
            let node = &mut self.nodes[n];
            node.intensity = clamp_unit(node.intensity + boost);
        }
        log::debug!("[ArchetypeGraph] {id} = {source:.3}, +{boost:.3} to neighbors");
        Ok(())
    }

    /// Pull every node toward the mean intensity of the active nodes.
    pub fn harmonize_all(&mut self) {
        let Some(mean) = self.active_mean() else {
            return;
        };
        let rate = self.harmonize_rate;
        for node in &mut self.nodes {
            node.intensity = clamp_unit(node.intensity + (mean - node.intensity) * rate);
        }
    }

    /// Influence flowing into `id` from every node that lists it as a
    /// connection, capped at 1.
    pub fn calculate_total_influence(&self, id: &str) -> f32 {
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.connections.contains(id))
            .map(|n| n.intensity * self.propagation_factor)
            .sum();
        total.min(1.0)
    }

    /// The active node with the highest intensity; the earliest added wins ties.
    pub fn get_most_active(&self) -> Option<&ArchetypeNode> {
        let mut best: Option<&ArchetypeNode> = None;
        for node in self.nodes.iter().filter(|n| n.active) {
            match best {
                Some(b) if node.intensity <= b.intensity => {}
                _ => best = Some(node),
            }
        }
        best
    }

    /// Population variance of active intensities (0 when none are active).
    pub fn variance(&self) -> f32 {
        let Some(mean) = self.active_mean() else {
            return 0.0;
        };
        let active: Vec<f32> = self.active_intensities().collect();
        active.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / active.len() as f32
    }

    /// Restore the nodes the graph was constructed with.
    pub fn reset(&mut self) {
        self.nodes = self.initial.clone();
        self.rebuild_index();
    }

    fn active_intensities(&self) -> impl Iterator<Item = f32> + '_ {
        self.nodes.iter().filter(|n| n.active).map(|n| n.intensity)
    }

    fn active_mean(&self) -> Option<f32> {
        let (sum, count) = self
            .active_intensities()
            .fold((0.0_f32, 0_usize), |(s, c), v| (s + v, c + 1));
        (count > 0).then(|| sum / count as f32)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }

    fn position(&self, id: &str) -> AffectResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| AffectError::UnknownArchetype { id: id.to_string() })
    }

    fn require(&self, id: &str) -> AffectResult<()> {
        self.position(id).map(|_| ())
    }

    fn node_mut(&mut self, id: &str) -> AffectResult<&mut ArchetypeNode> {
        let idx = self.position(id)?;
        Ok(&mut self.nodes[idx])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(nodes: Vec<ArchetypeNode>) -> ArchetypeGraph {
        ArchetypeGraph::new(nodes, &GraphConfig::default())
    }

    #[test]
    fn test_neighbors_gain_exactly_one_hop() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.0).with_connections(["b"]),
            ArchetypeNode::new("b", 0.2).with_connections(["c"]),
            ArchetypeNode::new("c", 0.1),
        ]);
        g.update_intensity("a", 0.8).unwrap();
        assert_eq!(g.intensity("a"), Some(0.8));
        assert!((g.intensity("b").unwrap() - (0.2 + 0.8 * 0.15)).abs() < 1e-6);
        // b's gain does not continue on to c
        assert_eq!(g.intensity("c"), Some(0.1));
    }

    #[test]
    fn test_cycles_do_not_recurse() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.0).with_connections(["b"]),
            ArchetypeNode::new("b", 0.0).with_connections(["a"]),
        ]);
        g.update_intensity("a", 1.0).unwrap();
        assert_eq!(g.intensity("a"), Some(1.0));
        assert!((g.intensity("b").unwrap() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_connections_are_directional() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.0).with_connections(["b"]),
            ArchetypeNode::new("b", 0.0),
        ]);
        g.update_intensity("b", 1.0).unwrap();
        assert_eq!(g.intensity("a"), Some(0.0));
    }

    #[test]
    fn test_input_and_neighbor_are_clamped() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.0).with_connections(["b"]),
            ArchetypeNode::new("b", 0.95),
        ]);
        g.update_intensity("a", 7.0).unwrap();
        assert_eq!(g.intensity("a"), Some(1.0));
        assert_eq!(g.intensity("b"), Some(1.0));
        g.update_intensity("a", f32::NAN).unwrap();
        assert_eq!(g.intensity("a"), Some(0.0));
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let mut g = ArchetypeGraph::default();
        let err = g.update_intensity("nobody", 0.5).unwrap_err();
        assert!(matches!(err, AffectError::UnknownArchetype { .. }));
        assert!(g.connect(ids::SAGE, "nobody").is_err());
    }

    #[test]
    fn test_harmonize_reduces_variance() {
        let mut g = ArchetypeGraph::default();
        g.update_intensity(ids::SENTINEL, 1.0).unwrap();
        g.update_intensity(ids::DREAMER, 0.0).unwrap();
        let mut last = g.variance();
        for _ in 0..20 {
            g.harmonize_all();
            let v = g.variance();
            assert!(v < last || (v == 0.0 && last == 0.0), "variance rose: {last} -> {v}");
            last = v;
        }
    }

    #[test]
    fn test_harmonize_ignores_inactive_for_mean() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.2),
            ArchetypeNode::new("b", 0.4),
            ArchetypeNode::new("off", 1.0),
        ]);
        g.set_active("off", false).unwrap();
        g.harmonize_all();
        // mean of active = 0.3; inactive node also moves toward it
        assert!((g.intensity("a").unwrap() - 0.22).abs() < 1e-6);
        assert!((g.intensity("off").unwrap() - (1.0 - 0.7 * 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_total_influence_sums_incoming() {
        let g = graph(vec![
            ArchetypeNode::new("a", 0.8).with_connections(["c"]),
            ArchetypeNode::new("b", 0.4).with_connections(["c"]),
            ArchetypeNode::new("c", 0.0).with_connections(["a"]),
        ]);
        assert!((g.calculate_total_influence("c") - (0.8 + 0.4) * 0.15).abs() < 1e-6);
        assert!((g.calculate_total_influence("a") - 0.0).abs() < 1e-6);
        assert_eq!(g.calculate_total_influence("missing"), 0.0);
    }

    #[test]
    fn test_total_influence_capped() {
        let nodes = (0..20)
            .map(|i| ArchetypeNode::new(format!("n{i}"), 1.0).with_connections(["hub"]))
            .chain(std::iter::once(ArchetypeNode::new("hub", 0.0)))
            .collect();
        assert_eq!(graph(nodes).calculate_total_influence("hub"), 1.0);
    }

    #[test]
    fn test_most_active_first_seen_wins_ties() {
        let mut g = graph(vec![
            ArchetypeNode::new("a", 0.7),
            ArchetypeNode::new("b", 0.7),
            ArchetypeNode::new("c", 0.9),
        ]);
        g.set_active("c", false).unwrap();
        assert_eq!(g.get_most_active().map(|n| n.id.as_str()), Some("a"));
    }

    #[test]
    fn test_reset_restores_construction_state() {
        let mut g = ArchetypeGraph::default();
        g.update_intensity(ids::SAGE, 0.0).unwrap();
        g.set_active(ids::ARTISAN, false).unwrap();
        g.reset();
        assert_eq!(g.nodes(), default_archetypes().as_slice());
        assert!(g.update_intensity(ids::SAGE, 0.5).is_ok());
    }

    proptest! {
        #[test]
        fn prop_intensities_stay_in_unit_range(
            updates in proptest::collection::vec((0usize..6, -2.0f32..3.0), 1..60),
            harmonize_every in 1usize..5,
        ) {
            let mut g = ArchetypeGraph::default();
            let names: Vec<String> = g.nodes().iter().map(|n| n.id.clone()).collect();
            for (i, (node, value)) in updates.into_iter().enumerate() {
                g.update_intensity(&names[node], value).unwrap();
                if i % harmonize_every == 0 {
                    g.harmonize_all();
                }
                for n in g.nodes() {
                    prop_assert!((0.0..=1.0).contains(&n.intensity));
                }
            }
        }
    }
}
