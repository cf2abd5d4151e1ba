//! Read-only query facade over the dependency graph.
//!
//! Every operation here takes a read lock and never mutates the graph, so
//! queries are safe to run concurrently with each other. Results are
//! memoized in a small cache keyed by `(operation, argument)`; the cache is
//! dropped wholesale whenever the graph's mutation epoch moves, so no query
//! ever observes a stale answer.

use crate::domain::ResourceId;
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, HealingOrder};
use petgraph::Direction;
use petgraph::visit::EdgeRef;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Blast-radius report for a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    /// The resource whose failure is being analyzed.
    pub resource_id: ResourceId,

    /// Resources with a direct dependency edge onto this one.
    pub direct_dependents: Vec<ResourceId>,

    /// Every resource transitively affected; a superset of
    /// `direct_dependents`, empty exactly when it is empty.
    pub transitive_dependents: Vec<ResourceId>,
}

/// Human-readable answer to "does `a` depend on `b`, and why?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyExplanation {
    /// Whether a dependency path exists.
    pub exists: bool,

    /// Shortest dependency path from `a` to `b`, empty when none exists.
    pub path: Vec<ResourceId>,

    /// Rendered justification built from relationship types and edge
    /// provenance.
    pub explanation: String,
}

/// Counters for observability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiStatistics {
    /// Total queries served.
    pub queries_served: u64,

    /// Queries answered from the cache.
    pub cache_hits: u64,

    /// Queries that had to recompute.
    pub cache_misses: u64,

    /// Per-operation query counts.
    pub per_operation: BTreeMap<String, u64>,
}

/// Cache plus counters, behind one lock.
#[derive(Default)]
struct QueryState {
    /// Graph epoch the cached entries were computed at.
    epoch: u64,

    /// Cached results keyed by (operation, argument).
    entries: HashMap<(&'static str, String), serde_json::Value>,

    stats: ApiStatistics,
}

/// Read-only facade exposing impact, chain, ordering, and explanation
/// queries over a shared [`DependencyGraph`].
pub struct GraphQuery {
    graph: Arc<RwLock<DependencyGraph>>,
    state: Mutex<QueryState>,
}

impl GraphQuery {
    /// Create a query facade over a shared graph.
    #[must_use]
    pub fn new(graph: Arc<RwLock<DependencyGraph>>) -> Self {
        Self {
            graph,
            state: Mutex::new(QueryState::default()),
        }
    }

    /// Blast-radius query: who is affected if `id` changes or fails?
    ///
    /// Breadth-first traversal over *dependent* (incoming) edges. Depth 1
    /// is "direct"; everything reachable is "transitive". A visited set
    /// guarantees termination on cyclic graphs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if `id` is not in the graph.
    pub async fn get_impacted_resources(&self, id: &ResourceId) -> Result<ImpactReport> {
        self.cached("impact", id.to_string(), |graph| {
            let start = graph
                .node_index(id)
                .ok_or_else(|| Error::ResourceNotFound(id.clone()))?;
            let petgraph = graph.petgraph();

            let mut direct = Vec::new();
            let mut transitive = Vec::new();
            let mut visited: HashSet<_> = HashSet::from([start]);
            let mut queue: VecDeque<(_, usize)> = VecDeque::from([(start, 0)]);

            while let Some((node, depth)) = queue.pop_front() {
                for edge in petgraph.edges_directed(node, Direction::Incoming) {
                    let dependent = edge.source();
                    if !visited.insert(dependent) {
                        continue;
                    }
                    let dependent_id = petgraph[dependent].clone();
                    if depth == 0 {
                        direct.push(dependent_id.clone());
                    }
                    transitive.push(dependent_id);
                    queue.push_back((dependent, depth + 1));
                }
            }

            direct.sort();
            transitive.sort();

            Ok(ImpactReport {
                resource_id: id.clone(),
                direct_dependents: direct,
                transitive_dependents: transitive,
            })
        })
        .await
    }

    /// Enumerate all maximal simple dependency chains starting at `id`.
    ///
    /// A chain ends at a terminal node (no outgoing dependency edges) or
    /// when the only continuations revisit the current path (inference
    /// noise). Path length is additionally bounded by the node count, so
    /// the walk terminates on any input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if `id` is not in the graph.
    pub async fn get_dependency_chain(&self, id: &ResourceId) -> Result<Vec<Vec<ResourceId>>> {
        self.cached("chain", id.to_string(), |graph| {
            let start = graph
                .node_index(id)
                .ok_or_else(|| Error::ResourceNotFound(id.clone()))?;
            let petgraph = graph.petgraph();
            let max_len = petgraph.node_count();

            let neighbors = |node| {
                let mut targets: Vec<_> = petgraph
                    .edges(node)
                    .map(|edge| edge.target())
                    .collect();
                targets.sort_by(|a, b| petgraph[*a].cmp(&petgraph[*b]));
                targets.dedup();
                targets
            };

            let mut chains = Vec::new();
            // Iterative DFS: each frame is (node, candidate targets, next
            // candidate index).
            let mut stack = vec![(start, neighbors(start), 0usize)];
            let mut on_path: HashSet<_> = HashSet::from([start]);

            while !stack.is_empty() {
                let depth = stack.len();
                let (node, next) = {
                    let frame = stack.last_mut().expect("stack is non-empty");
                    let node = frame.0;
                    let mut next = None;
                    while frame.2 < frame.1.len() {
                        let candidate = frame.1[frame.2];
                        frame.2 += 1;
                        if on_path.contains(&candidate) || depth >= max_len {
                            continue;
                        }
                        next = Some(candidate);
                        break;
                    }
                    (node, next)
                };

                if let Some(next) = next {
                    on_path.insert(next);
                    let targets = neighbors(next);
                    stack.push((next, targets, 0));
                    continue;
                }

                // No unvisited continuation left. The path is maximal when
                // every outgoing target sits on the current path (terminal
                // node or a cycle closing back onto the path).
                let maximal = neighbors(node).iter().all(|t| on_path.contains(t));
                if maximal && stack.len() > 1 {
                    let path: Vec<ResourceId> = stack
                        .iter()
                        .map(|(frame_node, _, _)| petgraph[*frame_node].clone())
                        .collect();
                    chains.push(path);
                }

                stack.pop();
                on_path.remove(&node);
            }

            Ok(chains)
        })
        .await
    }

    /// Healing order for an explicit set of failed resources.
    ///
    /// Delegates to [`DependencyGraph::get_healing_order`] restricted to
    /// the closure of `failed_ids` and their dependencies.
    pub async fn get_healing_order(&self, failed_ids: &[ResourceId]) -> Result<HealingOrder> {
        let mut ids: Vec<String> = failed_ids.iter().map(ToString::to_string).collect();
        ids.sort();
        self.cached("healing_order", ids.join(","), |graph| {
            Ok(graph.get_healing_order(Some(failed_ids)))
        })
        .await
    }

    /// Explain whether and why `a` depends on `b`.
    ///
    /// Finds the shortest dependency path `a -> ... -> b` and renders each
    /// hop from its relationship type and provenance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if either endpoint is missing.
    pub async fn explain_dependency(
        &self,
        a: &ResourceId,
        b: &ResourceId,
    ) -> Result<DependencyExplanation> {
        self.cached("explain", format!("{a}->{b}"), |graph| {
            let start = graph
                .node_index(a)
                .ok_or_else(|| Error::ResourceNotFound(a.clone()))?;
            let goal = graph
                .node_index(b)
                .ok_or_else(|| Error::ResourceNotFound(b.clone()))?;
            let petgraph = graph.petgraph();

            // BFS shortest path over dependency edges.
            let mut parent: HashMap<_, _> = HashMap::new();
            let mut visited: HashSet<_> = HashSet::from([start]);
            let mut queue: VecDeque<_> = VecDeque::from([start]);
            let mut found = start == goal;

            'search: while let Some(node) = queue.pop_front() {
                let mut targets: Vec<_> = petgraph.edges(node).map(|e| e.target()).collect();
                targets.sort_by(|x, y| petgraph[*x].cmp(&petgraph[*y]));
                for next in targets {
                    if !visited.insert(next) {
                        continue;
                    }
                    parent.insert(next, node);
                    if next == goal {
                        found = true;
                        break 'search;
                    }
                    queue.push_back(next);
                }
            }

            if !found {
                return Ok(DependencyExplanation {
                    exists: false,
                    path: Vec::new(),
                    explanation: format!("{a} has no dependency path to {b}"),
                });
            }

            let mut indices = vec![goal];
            while let Some(&prev) = parent.get(indices.last().expect("path is non-empty")) {
                indices.push(prev);
            }
            indices.reverse();

            let path: Vec<ResourceId> =
                indices.iter().map(|&n| petgraph[n].clone()).collect();

            let mut sentences = Vec::new();
            for pair in indices.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                let edge = petgraph
                    .edges_connecting(from, to)
                    .max_by(|x, y| x.weight().confidence.total_cmp(&y.weight().confidence));
                if let Some(edge) = edge {
                    let info = edge.weight();
                    let origin = if info.provenance.auto_detected {
                        format!("inferred by {}", info.provenance.detection_method)
                    } else {
                        "explicitly declared".to_string()
                    };
                    sentences.push(format!(
                        "{} depends on {} via {} ({origin}, confidence {:.2})",
                        petgraph[from], petgraph[to], info.relationship_type, info.confidence
                    ));
                }
            }

            Ok(DependencyExplanation {
                exists: true,
                path,
                explanation: sentences.join("; "),
            })
        })
        .await
    }

    /// Counters for observability.
    pub async fn get_api_statistics(&self) -> ApiStatistics {
        self.state.lock().await.stats.clone()
    }

    /// Serve a query through the cache.
    ///
    /// The cache is valid for exactly one graph epoch; any mutation since
    /// the last query clears it.
    async fn cached<T, F>(&self, operation: &'static str, argument: String, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&DependencyGraph) -> Result<T>,
    {
        let graph = self.graph.read().await;
        let epoch = graph.epoch();

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            state.entries.clear();
            state.epoch = epoch;
        }

        state.stats.queries_served += 1;
        *state
            .stats
            .per_operation
            .entry(operation.to_string())
            .or_insert(0) += 1;

        let key = (operation, argument);
        if let Some(value) = state.entries.get(&key) {
            if let Ok(result) = serde_json::from_value(value.clone()) {
                state.stats.cache_hits += 1;
                return Ok(result);
            }
        }
        state.stats.cache_misses += 1;
        drop(state);

        let result = compute(&graph)?;

        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            if let Ok(value) = serde_json::to_value(&result) {
                state.entries.insert(key, value);
            }
        }
        Ok(result)
    }
}
