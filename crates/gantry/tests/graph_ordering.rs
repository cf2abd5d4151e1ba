//! Integration tests for the dependency graph and healing-order
//! computation.
//!
//! Covers the ordering invariant (a node never precedes a node it depends
//! on), idempotent edge insertion, impact queries, and termination on
//! cyclic inputs, including property tests over randomly generated
//! graphs.

use gantry::domain::{EdgeProvenance, ResourceId};
use gantry::graph::{DependencyGraph, EdgeInfo};
use gantry::query::GraphQuery;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

fn info(rel: &str, confidence: f64) -> EdgeInfo {
    EdgeInfo {
        relationship_type: rel.to_string(),
        confidence,
        provenance: EdgeProvenance {
            auto_detected: true,
            detection_method: "test".to_string(),
            phase_source: None,
        },
    }
}

/// The reference scenario: svc-1 -> subnet-1 -> vpc-1.
fn network_stack() -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    graph.add_node(ResourceId::new("vpc-1"), "network::vpc", Some("net".to_string()));
    graph.add_node(
        ResourceId::new("subnet-1"),
        "network::subnet",
        Some("net".to_string()),
    );
    graph.add_node(
        ResourceId::new("svc-1"),
        "compute::service",
        Some("compute".to_string()),
    );
    graph.add_dependency(
        &ResourceId::new("subnet-1"),
        &ResourceId::new("vpc-1"),
        info("subnet_vpc", 0.9),
    );
    graph.add_dependency(
        &ResourceId::new("svc-1"),
        &ResourceId::new("subnet-1"),
        info("service_subnet", 0.9),
    );
    graph
}

// ========== Reference Scenario ==========

#[test]
fn healing_order_for_network_stack() {
    let graph = network_stack();
    let order = graph.get_healing_order(Some(&[
        ResourceId::new("svc-1"),
        ResourceId::new("subnet-1"),
    ]));

    assert_eq!(
        order.order,
        vec![ResourceId::new("subnet-1"), ResourceId::new("svc-1")]
    );
    assert!(order.warnings.is_empty());
}

#[tokio::test]
async fn impact_for_network_stack() {
    let query = GraphQuery::new(Arc::new(RwLock::new(network_stack())));

    let report = query
        .get_impacted_resources(&ResourceId::new("vpc-1"))
        .await
        .unwrap();
    assert_eq!(report.direct_dependents, vec![ResourceId::new("subnet-1")]);
    assert_eq!(
        report.transitive_dependents,
        vec![ResourceId::new("subnet-1"), ResourceId::new("svc-1")]
    );
}

// ========== Idempotence ==========

#[test]
fn add_dependency_twice_yields_one_edge() {
    let mut graph = network_stack();
    let before = graph.get_graph_stats().edges;

    let inserted = graph.add_dependency(
        &ResourceId::new("subnet-1"),
        &ResourceId::new("vpc-1"),
        info("subnet_vpc", 0.9),
    );

    assert!(!inserted);
    assert_eq!(graph.get_graph_stats().edges, before);
}

// ========== Impact Superset Property ==========

#[tokio::test]
async fn transitive_is_superset_and_empty_iff_direct_empty() {
    let query = GraphQuery::new(Arc::new(RwLock::new(network_stack())));

    for id in ["vpc-1", "subnet-1", "svc-1"] {
        let report = query
            .get_impacted_resources(&ResourceId::new(id))
            .await
            .unwrap();

        let direct: HashSet<_> = report.direct_dependents.iter().collect();
        let transitive: HashSet<_> = report.transitive_dependents.iter().collect();
        assert!(direct.is_subset(&transitive), "superset violated for {id}");
        assert_eq!(
            report.direct_dependents.is_empty(),
            report.transitive_dependents.is_empty(),
            "empty-iff violated for {id}"
        );
    }
}

// ========== Property Tests ==========

fn node_id(index: usize) -> ResourceId {
    ResourceId::new(format!("r{index:02}"))
}

/// Transitive reachability over dependency edges, computed independently
/// of the implementation under test.
fn reaches(edges: &HashMap<usize, Vec<usize>>, from: usize, to: usize) -> bool {
    let mut seen = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(node) = queue.pop_front() {
        if node == to {
            return true;
        }
        for &next in edges.get(&node).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

proptest! {
    /// On acyclic graphs the healing order always respects the partial
    /// order: nothing precedes one of its own dependencies.
    #[test]
    fn healing_order_respects_dependencies_on_dags(
        node_count in 3usize..12,
        raw_edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
    ) {
        let mut graph = DependencyGraph::new();
        for index in 0..node_count {
            graph.add_node(node_id(index), "compute::service", None);
        }

        // Orient every edge from the higher index to the lower one, which
        // cannot produce a cycle.
        let mut dep_edges: HashMap<usize, Vec<usize>> = HashMap::new();
        for (a, b) in raw_edges {
            let (a, b) = (a % node_count, b % node_count);
            if a == b {
                continue;
            }
            let (source, target) = if a > b { (a, b) } else { (b, a) };
            if graph.add_dependency(&node_id(source), &node_id(target), info("dep", 0.8)) {
                dep_edges.entry(source).or_default().push(target);
            }
        }

        let targets: Vec<ResourceId> = (0..node_count).map(node_id).collect();
        let result = graph.get_healing_order(Some(&targets));

        prop_assert!(result.warnings.is_empty());
        prop_assert_eq!(result.order.len(), node_count);

        let position: HashMap<&ResourceId, usize> = result
            .order
            .iter()
            .enumerate()
            .map(|(position, id)| (id, position))
            .collect();
        for index in 0..node_count {
            for &dep in dep_edges.get(&index).into_iter().flatten() {
                prop_assert!(
                    position[&node_id(dep)] < position[&node_id(index)],
                    "{} depends on {} but is ordered first",
                    node_id(index),
                    node_id(dep)
                );
            }
        }

        // Stronger form: no emitted node precedes anything it transitively
        // depends on.
        for i in 0..result.order.len() {
            for j in (i + 1)..result.order.len() {
                let earlier: usize = result.order[i].as_str()[1..].parse().unwrap();
                let later: usize = result.order[j].as_str()[1..].parse().unwrap();
                prop_assert!(
                    !reaches(&dep_edges, earlier, later),
                    "{} precedes its dependency {}",
                    result.order[i],
                    result.order[j]
                );
            }
        }
    }

    /// On arbitrary (possibly cyclic) graphs the computation terminates
    /// and still emits every requested node exactly once.
    #[test]
    fn healing_order_terminates_on_cycles(
        node_count in 2usize..10,
        raw_edges in prop::collection::vec((0usize..10, 0usize..10), 0..40),
    ) {
        let mut graph = DependencyGraph::new();
        for index in 0..node_count {
            graph.add_node(node_id(index), "compute::service", None);
        }
        for (a, b) in raw_edges {
            let (a, b) = (a % node_count, b % node_count);
            if a != b {
                graph.add_dependency(&node_id(a), &node_id(b), info("dep", 0.5));
            }
        }

        let targets: Vec<ResourceId> = (0..node_count).map(node_id).collect();
        let result = graph.get_healing_order(Some(&targets));

        prop_assert_eq!(result.order.len(), node_count);
        let unique: HashSet<_> = result.order.iter().collect();
        prop_assert_eq!(unique.len(), node_count);
    }
}

// ========== Cycle Handling ==========

#[test]
fn cyclic_input_is_ordered_with_warning() {
    let mut graph = DependencyGraph::new();
    for id in ["a-1", "b-1"] {
        graph.add_node(ResourceId::new(id), "compute::service", None);
    }
    graph.add_dependency(&ResourceId::new("a-1"), &ResourceId::new("b-1"), info("x", 0.9));
    graph.add_dependency(&ResourceId::new("b-1"), &ResourceId::new("a-1"), info("y", 0.3));

    let result =
        graph.get_healing_order(Some(&[ResourceId::new("a-1"), ResourceId::new("b-1")]));

    assert_eq!(result.order.len(), 2);
    assert_eq!(result.warnings.len(), 1);
    // The weaker edge (b -> a, 0.3) is sacrificed.
    assert_eq!(result.warnings[0].source, ResourceId::new("b-1"));
    assert!((result.warnings[0].confidence - 0.3).abs() < f64::EPSILON);
}

#[tokio::test]
async fn chain_query_bounded_on_cycles() {
    let mut graph = DependencyGraph::new();
    for id in ["a-1", "b-1", "c-1"] {
        graph.add_node(ResourceId::new(id), "compute::service", None);
    }
    graph.add_dependency(&ResourceId::new("a-1"), &ResourceId::new("b-1"), info("x", 0.9));
    graph.add_dependency(&ResourceId::new("b-1"), &ResourceId::new("c-1"), info("y", 0.9));
    graph.add_dependency(&ResourceId::new("c-1"), &ResourceId::new("a-1"), info("z", 0.9));

    let query = GraphQuery::new(Arc::new(RwLock::new(graph)));
    let chains = query
        .get_dependency_chain(&ResourceId::new("a-1"))
        .await
        .unwrap();

    // One maximal simple path, cut where the cycle closes.
    assert_eq!(chains.len(), 1);
    assert_eq!(
        chains[0],
        vec![
            ResourceId::new("a-1"),
            ResourceId::new("b-1"),
            ResourceId::new("c-1")
        ]
    );
}
