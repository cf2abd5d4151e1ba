//! In-memory dependency graph built from catalog records.
//!
//! The graph is a derived, rebuildable cache over the catalog: it
//! accelerates traversal queries for the current process lifetime and is
//! never the authoritative store. It uses petgraph's `DiGraph` with nodes
//! holding resource IDs and a side map for node attributes.
//!
//! # Edge Direction Convention
//!
//! Edges point from **dependent to dependency**: `source -> target` means
//! the source depends on the target, so the target must exist (and heal)
//! before the source. Concretely, a subnet inside a VPC is stored as
//! `subnet-1 -> vpc-1` with relationship type `subnet_vpc`.
//!
//! # Cycle Tolerance
//!
//! Heuristic inference can introduce cycles. The graph tolerates them:
//! every traversal carries a visited-set guard, and ordering computations
//! break cycles at the lowest-confidence edge with a warning rather than
//! failing or looping (see [`ordering`]).

mod ordering;

use crate::domain::{Edge, EdgeProvenance, ResourceId, ResourceRecord, ResourceState};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;

pub use ordering::{CycleWarning, HealingOrder};

/// Attributes of an edge in the graph.
///
/// Same data as a catalog [`Edge`] minus the endpoints, which petgraph
/// already encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeInfo {
    /// Relationship taxonomy string.
    pub relationship_type: String,

    /// Confidence in [0, 1].
    pub confidence: f64,

    /// How the edge was detected.
    pub provenance: EdgeProvenance,
}

impl From<&Edge> for EdgeInfo {
    fn from(edge: &Edge) -> Self {
        Self {
            relationship_type: edge.relationship_type.clone(),
            confidence: edge.confidence,
            provenance: edge.provenance.clone(),
        }
    }
}

/// Node attributes tracked alongside the petgraph node.
#[derive(Debug, Clone)]
pub struct NodeAttrs {
    /// Resource taxonomy string.
    pub resource_type: String,

    /// Current lifecycle state.
    pub state: ResourceState,

    /// Deployment phase, if known.
    pub phase: Option<String>,
}

/// Node and edge counts for observability.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    /// Total nodes.
    pub nodes: usize,

    /// Total edges.
    pub edges: usize,

    /// Nodes currently healthy.
    pub healthy: usize,

    /// Nodes currently drifted.
    pub drift: usize,

    /// Soft-deleted nodes still present in the graph.
    pub deleted: usize,

    /// Nodes not yet synced.
    pub unknown: usize,

    /// Mutation epoch; bumps on every write.
    pub epoch: u64,
}

/// The in-memory dependency graph.
///
/// Mutations must be serialized by the owner (the engine wraps the graph
/// in `Arc<tokio::sync::RwLock<_>>`); read queries may run concurrently.
pub struct DependencyGraph {
    /// Directed graph; node weight is the resource ID, edge weight the
    /// relationship attributes.
    graph: DiGraph<ResourceId, EdgeInfo>,

    /// Mapping from resource ID to graph node index.
    node_map: HashMap<ResourceId, NodeIndex>,

    /// Node attributes (type, state, phase) keyed by resource ID.
    attrs: HashMap<ResourceId, NodeAttrs>,

    /// Bumped on every mutation; used to invalidate query caches.
    epoch: u64,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            attrs: HashMap::new(),
            epoch: 0,
        }
    }

    /// Rebuild a graph from catalog records and relationships.
    ///
    /// Edges referencing a missing node are dropped with a warning rather
    /// than propagated as failures: the graph is a cache, and the catalog
    /// remains the source of truth.
    #[must_use]
    pub fn from_catalog_parts(records: &[ResourceRecord], edges: &[Edge]) -> Self {
        let mut graph = Self::new();

        for record in records {
            graph.restore_node(
                record.id.clone(),
                record.resource_type.clone(),
                record.phase.clone(),
                record.state,
            );
        }

        for edge in edges {
            if !graph.node_map.contains_key(&edge.source_id)
                || !graph.node_map.contains_key(&edge.target_id)
            {
                tracing::warn!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    "dropping relationship with missing endpoint during rebuild"
                );
                continue;
            }
            graph.add_dependency(&edge.source_id, &edge.target_id, EdgeInfo::from(edge));
        }

        graph
    }

    /// Current mutation epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn bump(&mut self) {
        self.epoch += 1;
    }

    /// Whether a node exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.node_map.contains_key(id)
    }

    /// All node IDs, ascending.
    #[must_use]
    pub fn node_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.node_map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Node attributes for `id`, if present.
    #[must_use]
    pub fn attrs_of(&self, id: &ResourceId) -> Option<&NodeAttrs> {
        self.attrs.get(id)
    }

    /// Lifecycle state for `id`, if present.
    #[must_use]
    pub fn state_of(&self, id: &ResourceId) -> Option<ResourceState> {
        self.attrs.get(id).map(|a| a.state)
    }

    /// Insert or update a node from a live observation.
    ///
    /// New nodes start `Healthy`. Updating an existing node preserves its
    /// edges and state, refreshing only type and phase. A node previously
    /// marked `Deleted` re-enters at `Unknown`: deletion is terminal in
    /// place and never silently resurrected.
    ///
    /// Returns the node's resulting state.
    pub fn add_node(
        &mut self,
        id: ResourceId,
        resource_type: impl Into<String>,
        phase: Option<String>,
    ) -> ResourceState {
        let resource_type = resource_type.into();

        if let Some(attrs) = self.attrs.get_mut(&id) {
            let state = if attrs.state == ResourceState::Deleted {
                tracing::info!(resource = %id, "deleted resource re-observed, re-entering as unknown");
                ResourceState::Unknown
            } else {
                attrs.state
            };
            attrs.resource_type = resource_type;
            attrs.phase = phase;
            attrs.state = state;
            self.bump();
            return state;
        }

        let index = self.graph.add_node(id.clone());
        self.node_map.insert(id.clone(), index);
        self.attrs.insert(
            id,
            NodeAttrs {
                resource_type,
                state: ResourceState::Healthy,
                phase,
            },
        );
        self.bump();
        ResourceState::Healthy
    }

    /// Insert a node with an explicit state; used when rebuilding from
    /// catalog records, which already carry the authoritative state.
    pub fn restore_node(
        &mut self,
        id: ResourceId,
        resource_type: String,
        phase: Option<String>,
        state: ResourceState,
    ) {
        let index = match self.node_map.get(&id) {
            Some(index) => *index,
            None => {
                let index = self.graph.add_node(id.clone());
                self.node_map.insert(id.clone(), index);
                index
            }
        };
        debug_assert_eq!(self.graph[index], id);
        self.attrs.insert(
            id,
            NodeAttrs {
                resource_type,
                state,
                phase,
            },
        );
        self.bump();
    }

    /// Insert a directed dependency edge: `source` depends on `target`.
    ///
    /// Rejections are logged, never thrown. The graph repairs bad input
    /// defensively:
    /// - self-loops are refused;
    /// - edges with a missing endpoint are refused;
    /// - an existing (source, target, type) edge makes this a no-op.
    ///
    /// Returns `true` only when a new edge was inserted.
    pub fn add_dependency(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        info: EdgeInfo,
    ) -> bool {
        if source == target {
            tracing::warn!(resource = %source, "rejecting self-loop dependency");
            return false;
        }

        let (Some(&source_node), Some(&target_node)) =
            (self.node_map.get(source), self.node_map.get(target))
        else {
            tracing::warn!(
                source = %source,
                target = %target,
                "rejecting dependency with unregistered endpoint"
            );
            return false;
        };

        let duplicate = self
            .graph
            .edges_connecting(source_node, target_node)
            .any(|edge| edge.weight().relationship_type == info.relationship_type);
        if duplicate {
            return false;
        }

        self.graph.add_edge(source_node, target_node, info);
        self.bump();
        true
    }

    /// Remove a single dependency edge, identified by endpoints and
    /// relationship type. Used to roll back an in-memory edge whose
    /// persistence failed.
    ///
    /// Returns `true` if the edge existed.
    pub fn remove_dependency(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        relationship_type: &str,
    ) -> bool {
        let (Some(&source_node), Some(&target_node)) =
            (self.node_map.get(source), self.node_map.get(target))
        else {
            return false;
        };

        let found = self
            .graph
            .edges_connecting(source_node, target_node)
            .find(|edge| edge.weight().relationship_type == relationship_type)
            .map(|edge| edge.id());

        match found {
            Some(edge_index) => {
                self.graph.remove_edge(edge_index);
                self.bump();
                true
            }
            None => false,
        }
    }

    /// Remove a node and all incident edges. Used after confirmed
    /// deletion, once the soft-deleted record no longer needs a live node.
    ///
    /// Returns `true` if the node existed.
    pub fn remove_resource(&mut self, id: &ResourceId) -> bool {
        let Some(index) = self.node_map.remove(id) else {
            return false;
        };
        self.attrs.remove(id);

        self.graph.remove_node(index);

        // petgraph swaps the last node into the removed slot, so the moved
        // node's index must be refreshed in the map.
        if let Some(weight) = self.graph.node_weight(index) {
            let moved_id = weight.clone();
            self.node_map.insert(moved_id, index);
        }

        self.bump();
        true
    }

    /// Mark a node drifted. Refused (with a warning) for deleted nodes.
    pub fn mark_drift(&mut self, id: &ResourceId) -> bool {
        self.transition(id, ResourceState::Drift)
    }

    /// Mark a node healthy, e.g. after a successful heal or catalog sync.
    /// Refused (with a warning) for deleted nodes.
    pub fn mark_healthy(&mut self, id: &ResourceId) -> bool {
        self.transition(id, ResourceState::Healthy)
    }

    /// Mark a node deleted. Terminal: only re-observation through
    /// [`DependencyGraph::add_node`] brings the ID back, and then as
    /// `Unknown`.
    pub fn mark_deleted(&mut self, id: &ResourceId) -> bool {
        let Some(attrs) = self.attrs.get_mut(id) else {
            tracing::warn!(resource = %id, "cannot mark unregistered resource deleted");
            return false;
        };
        attrs.state = ResourceState::Deleted;
        self.bump();
        true
    }

    fn transition(&mut self, id: &ResourceId, state: ResourceState) -> bool {
        let Some(attrs) = self.attrs.get_mut(id) else {
            tracing::warn!(resource = %id, target_state = %state, "cannot transition unregistered resource");
            return false;
        };
        if attrs.state == ResourceState::Deleted {
            tracing::warn!(resource = %id, target_state = %state, "refusing transition out of deleted");
            return false;
        }
        attrs.state = state;
        self.bump();
        true
    }

    /// Outgoing dependency edges of `id`: the resources it depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<(ResourceId, EdgeInfo)> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<(ResourceId, EdgeInfo)> = self
            .graph
            .edges(node)
            .map(|edge| (self.graph[edge.target()].clone(), edge.weight().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Incoming dependency edges of `id`: the resources that depend on it.
    #[must_use]
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<(ResourceId, EdgeInfo)> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<(ResourceId, EdgeInfo)> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|edge| (self.graph[edge.source()].clone(), edge.weight().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Node and edge counts plus per-state tallies.
    #[must_use]
    pub fn get_graph_stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
            healthy: 0,
            drift: 0,
            deleted: 0,
            unknown: 0,
            epoch: self.epoch,
        };
        for attrs in self.attrs.values() {
            match attrs.state {
                ResourceState::Healthy => stats.healthy += 1,
                ResourceState::Drift => stats.drift += 1,
                ResourceState::Deleted => stats.deleted += 1,
                ResourceState::Unknown => stats.unknown += 1,
            }
        }
        stats
    }

    /// IDs of all nodes currently in the drift state, ascending.
    #[must_use]
    pub fn drifted_nodes(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .attrs
            .iter()
            .filter(|(_, attrs)| attrs.state == ResourceState::Drift)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<ResourceId, EdgeInfo> {
        &self.graph
    }

    pub(crate) fn node_index(&self, id: &ResourceId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }
}
