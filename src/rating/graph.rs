//! Comparison graph and its connected components
//!
//! Strengths are only identifiable relative to athletes reachable through
//! some chain of comparisons, so the Bradley-Terry fit runs per component.

use crate::types::{AthleteId, Comparison};
use rustworkx_core::connectivity::connected_components;
use rustworkx_core::petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeSet, HashMap};

/// Undirected graph over athletes; an edge means at least one comparison
#[derive(Debug, Clone)]
pub struct ComparisonGraph {
    /// Nodes are added in athlete ID order, so node index == sorted position
    graph: UnGraph<AthleteId, ()>,
    index: HashMap<AthleteId, NodeIndex>,
    /// Component label per node
    labels: Vec<usize>,
    /// Members of each component, ascending; components ordered by their
    /// smallest member
    members: Vec<Vec<usize>>,
    /// Distinct opponent pairs within each component
    pair_counts: Vec<usize>,
}

impl ComparisonGraph {
    pub fn from_comparisons(comparisons: &[Comparison]) -> Self {
        let athletes: BTreeSet<&AthleteId> = comparisons
            .iter()
            .flat_map(|c| [&c.athlete_a, &c.athlete_b])
            .collect();

        let mut graph = UnGraph::with_capacity(athletes.len(), comparisons.len());
        let mut index = HashMap::with_capacity(athletes.len());
        for athlete_id in athletes {
            let node = graph.add_node(athlete_id.clone());
            index.insert(athlete_id.clone(), node);
        }

        for comparison in comparisons {
            let (a, b) = (index[&comparison.athlete_a], index[&comparison.athlete_b]);
            if a != b {
                graph.update_edge(a, b, ());
            }
        }

        let mut members: Vec<Vec<usize>> = connected_components(&graph)
            .into_iter()
            .map(|component| {
                let mut nodes: Vec<usize> = component.into_iter().map(|n| n.index()).collect();
                nodes.sort_unstable();
                nodes
            })
            .collect();
        members.sort_unstable_by_key(|nodes| nodes.first().copied());

        let mut labels = vec![0; graph.node_count()];
        for (label, nodes) in members.iter().enumerate() {
            for &node in nodes {
                labels[node] = label;
            }
        }

        let mut pair_counts = vec![0usize; members.len()];
        for edge in graph.edge_indices() {
            if let Some((a, _)) = graph.edge_endpoints(edge) {
                pair_counts[labels[a.index()]] += 1;
            }
        }

        Self {
            graph,
            index,
            labels,
            members,
            pair_counts,
        }
    }

    pub fn athlete(&self, node: usize) -> &AthleteId {
        &self.graph[NodeIndex::new(node)]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Distinct opponent pairs across the whole graph
    pub fn pair_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, athlete_id: &str) -> Option<usize> {
        self.index.get(athlete_id).map(|node| node.index())
    }

    pub fn component_count(&self) -> usize {
        self.members.len()
    }

    pub fn component_of(&self, athlete_id: &str) -> Option<usize> {
        self.index_of(athlete_id).map(|node| self.labels[node])
    }

    pub fn component_members(&self, component: usize) -> &[usize] {
        &self.members[component]
    }

    pub fn component_size(&self, component: usize) -> usize {
        self.members[component].len()
    }

    /// Distinct opponent pairs beyond what a spanning tree needs; zero means
    /// every relative strength rests on a single chain of evidence
    pub fn redundant_pairs(&self, component: usize) -> usize {
        self.pair_counts[component].saturating_sub(self.component_size(component).saturating_sub(1))
    }

    /// Whether two athletes are linked by some chain of comparisons
    pub fn connected(&self, a: &str, b: &str) -> bool {
        match (self.component_of(a), self.component_of(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }
}
