//! Healing-order computation.
//!
//! The healing order is a reverse topological sort restricted to the
//! dependency closure of a seed set: a node never appears before a node it
//! depends on. Only the seeds themselves are emitted; the closure supplies
//! ordering constraints (a drifted service is ordered after its healthy
//! subnet without the subnet showing up in the plan).
//!
//! Cycles introduced by noisy inference are broken at the lowest-confidence
//! edge, recorded as a [`CycleWarning`], and traversal continues;
//! degraded orderings must still terminate.

use super::DependencyGraph;
use crate::domain::ResourceId;
use petgraph::Direction;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// A dependency edge broken to restore acyclicity during ordering.
///
/// Non-fatal; logged and reported alongside the computed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleWarning {
    /// Dependent end of the broken edge.
    pub source: ResourceId,

    /// Dependency end of the broken edge.
    pub target: ResourceId,

    /// Relationship taxonomy of the broken edge.
    pub relationship_type: String,

    /// Confidence of the broken edge; ordering always breaks the
    /// lowest-confidence edge in the stuck region first.
    pub confidence: f64,
}

/// Result of a healing-order computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingOrder {
    /// Seed resources in dependency-respecting order: dependencies before
    /// the resources that depend on them. Ties broken by ascending ID.
    pub order: Vec<ResourceId>,

    /// Edges broken to escape cycles, if any.
    pub warnings: Vec<CycleWarning>,
}

impl DependencyGraph {
    /// Compute a healing order.
    ///
    /// Seeds are the explicit `targets` when given, otherwise every node
    /// currently in the drift state. Target IDs not present in the graph
    /// are skipped. The returned order contains exactly the (known) seeds;
    /// ordering constraints come from the full dependency closure of the
    /// seed set.
    #[must_use]
    pub fn get_healing_order(&self, targets: Option<&[ResourceId]>) -> HealingOrder {
        let seeds: Vec<NodeIndex> = match targets {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let index = self.node_index(id);
                    if index.is_none() {
                        tracing::debug!(resource = %id, "healing target not in graph, skipping");
                    }
                    index
                })
                .collect(),
            None => self
                .drifted_nodes()
                .iter()
                .filter_map(|id| self.node_index(id))
                .collect(),
        };

        if seeds.is_empty() {
            return HealingOrder {
                order: Vec::new(),
                warnings: Vec::new(),
            };
        }

        let graph = self.petgraph();
        let seed_set: HashSet<NodeIndex> = seeds.iter().copied().collect();

        // Dependency closure of the seeds, following outgoing edges.
        let mut scope: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for &seed in &seeds {
            if scope.insert(seed) {
                queue.push_back(seed);
            }
        }
        while let Some(node) = queue.pop_front() {
            for edge in graph.edges(node) {
                if scope.insert(edge.target()) {
                    queue.push_back(edge.target());
                }
            }
        }

        // Kahn's algorithm over the induced subgraph. A node is ready once
        // all of its in-scope dependencies were emitted (or broken away).
        let mut deps_remaining: HashMap<NodeIndex, usize> = HashMap::new();
        for &node in &scope {
            let count = graph
                .edges(node)
                .filter(|edge| scope.contains(&edge.target()))
                .count();
            deps_remaining.insert(node, count);
        }

        let mut ready: BinaryHeap<Reverse<(ResourceId, NodeIndex)>> = deps_remaining
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&node, _)| Reverse((graph[node].clone(), node)))
            .collect();

        let mut order = Vec::new();
        let mut warnings = Vec::new();
        let mut emitted: HashSet<NodeIndex> = HashSet::new();
        let mut broken: HashSet<EdgeIndex> = HashSet::new();

        while emitted.len() < scope.len() {
            let Some(Reverse((id, node))) = ready.pop() else {
                // Cycle: nothing is ready but work remains. Break the
                // lowest-confidence edge still pending in the stuck region
                // and keep going.
                match self.pick_breakable_edge(&scope, &emitted, &broken) {
                    Some(edge_index) => {
                        let (source, target) = graph
                            .edge_endpoints(edge_index)
                            .expect("edge came from live graph");
                        let info = &graph[edge_index];
                        let warning = CycleWarning {
                            source: graph[source].clone(),
                            target: graph[target].clone(),
                            relationship_type: info.relationship_type.clone(),
                            confidence: info.confidence,
                        };
                        tracing::warn!(
                            source = %warning.source,
                            target = %warning.target,
                            confidence = warning.confidence,
                            "breaking cyclic dependency to continue ordering"
                        );
                        warnings.push(warning);
                        broken.insert(edge_index);

                        let remaining = deps_remaining
                            .get_mut(&source)
                            .expect("source is in scope");
                        *remaining -= 1;
                        if *remaining == 0 {
                            ready.push(Reverse((graph[source].clone(), source)));
                        }
                    }
                    None => break,
                }
                continue;
            };

            if !emitted.insert(node) {
                continue;
            }

            if seed_set.contains(&node) {
                order.push(id);
            }

            for edge in graph.edges_directed(node, Direction::Incoming) {
                let dependent = edge.source();
                if !scope.contains(&dependent)
                    || emitted.contains(&dependent)
                    || broken.contains(&edge.id())
                {
                    continue;
                }
                let remaining = deps_remaining
                    .get_mut(&dependent)
                    .expect("dependent is in scope");
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(Reverse((graph[dependent].clone(), dependent)));
                }
            }
        }

        HealingOrder { order, warnings }
    }

    /// Find the lowest-confidence unbroken edge between two not-yet-emitted
    /// scope nodes. Ties fall back to (source, target, type) so the choice
    /// is deterministic.
    fn pick_breakable_edge(
        &self,
        scope: &HashSet<NodeIndex>,
        emitted: &HashSet<NodeIndex>,
        broken: &HashSet<EdgeIndex>,
    ) -> Option<EdgeIndex> {
        let graph = self.petgraph();
        let mut best: Option<(f64, ResourceId, ResourceId, String, EdgeIndex)> = None;

        for &node in scope {
            if emitted.contains(&node) {
                continue;
            }
            for edge in graph.edges(node) {
                let target = edge.target();
                if !scope.contains(&target)
                    || emitted.contains(&target)
                    || broken.contains(&edge.id())
                {
                    continue;
                }
                let candidate = (
                    edge.weight().confidence,
                    graph[node].clone(),
                    graph[target].clone(),
                    edge.weight().relationship_type.clone(),
                    edge.id(),
                );
                let better = match &best {
                    None => true,
                    Some(current) => candidate
                        .0
                        .total_cmp(&current.0)
                        .then_with(|| candidate.1.cmp(&current.1))
                        .then_with(|| candidate.2.cmp(&current.2))
                        .then_with(|| candidate.3.cmp(&current.3))
                        .is_lt(),
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        best.map(|(_, _, _, _, edge_index)| edge_index)
    }
}
