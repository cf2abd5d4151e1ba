//! Heuristic graph population from discovery observations.
//!
//! The populator turns a [`ResourceInfo`] into a graph node plus inferred
//! relationship edges. Inference is an **ordered list of rules**, each a
//! named (predicate, edge-factory) pair over the observation's metadata,
//! so individual rules are unit-testable away from the graph.
//!
//! Registration applies changes in-memory first and then persists them via
//! the catalog; an edge whose persistence fails is rolled back from the
//! graph so the cache never leads the system of record. Partial success is
//! reported, not swallowed.

use crate::catalog::ResourceCatalog;
use crate::domain::{Edge, EdgeProvenance, ResourceId, ResourceInfo, ResourceRecord, ResourceState};
use crate::error::Result;
use crate::graph::{DependencyGraph, EdgeInfo};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Confidence assigned to explicitly declared references.
pub const CONFIDENCE_EXPLICIT: f64 = 1.0;

/// Confidence assigned to references read from an `*_id` metadata field.
pub const CONFIDENCE_ID_REFERENCE: f64 = 0.9;

/// Confidence assigned to attachment-style references (security groups,
/// keys, clusters).
pub const CONFIDENCE_ATTACHMENT: f64 = 0.8;

/// Confidence assigned to name-only hints.
pub const CONFIDENCE_NAME_HINT: f64 = 0.7;

/// A reference to another resource produced by an inference rule.
#[derive(Debug, Clone)]
pub struct InferredTarget {
    /// The resource being depended upon.
    pub target_id: ResourceId,

    /// Relationship taxonomy for the edge.
    pub relationship_type: String,

    /// Confidence for the edge.
    pub confidence: f64,

    /// Whether the reference was explicit rather than heuristic.
    pub explicit: bool,
}

/// One inference rule: a named predicate plus an edge factory.
///
/// Rules are evaluated in order, once per registration. Plain function
/// pointers keep the table data-only and trivially testable.
pub struct InferenceRule {
    /// Rule name; recorded as the edge's `detection_method`.
    pub name: &'static str,

    /// Whether the rule applies to this observation.
    pub applies: fn(&ResourceInfo) -> bool,

    /// Produce the references implied by the observation.
    pub infer: fn(&ResourceInfo) -> Vec<InferredTarget>,
}

/// Outcome of a single resource registration.
///
/// Partial success is a first-class result: whatever succeeded stays
/// applied, and failures are listed rather than aborting the registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    /// The registered resource.
    pub resource_id: ResourceId,

    /// Whether the node and its catalog record were written.
    pub node_written: bool,

    /// Edges inferred and persisted.
    pub edges_applied: Vec<Edge>,

    /// Edges that could not be persisted, with the error text.
    pub edges_failed: Vec<(Edge, String)>,
}

impl RegistrationReport {
    /// True when the node and every inferred edge were applied.
    #[must_use]
    pub fn fully_applied(&self) -> bool {
        self.node_written && self.edges_failed.is_empty()
    }
}

/// Heuristic inference layer that registers resources into the graph and
/// catalog.
pub struct GraphPopulator {
    rules: Vec<InferenceRule>,
}

impl Default for GraphPopulator {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl GraphPopulator {
    /// Create a populator with the given rule table.
    #[must_use]
    pub fn new(rules: Vec<InferenceRule>) -> Self {
        Self { rules }
    }

    /// Names of the configured rules, in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    /// Run the rule table over an observation without touching the graph
    /// or catalog. Pure: usable for dry-run and explain purposes.
    ///
    /// Self-references are filtered out here so callers see exactly the
    /// edges a registration would attempt.
    #[must_use]
    pub fn infer_dependencies(&self, info: &ResourceInfo) -> Vec<Edge> {
        let source = ResourceId::new(info.resource_id.clone());
        let mut edges = Vec::new();

        for rule in &self.rules {
            if !(rule.applies)(info) {
                continue;
            }
            for inferred in (rule.infer)(info) {
                if inferred.target_id == source {
                    continue;
                }
                let Ok(edge) = Edge::new(
                    source.clone(),
                    inferred.target_id,
                    inferred.relationship_type,
                    inferred.confidence,
                    EdgeProvenance {
                        auto_detected: !inferred.explicit,
                        detection_method: rule.name.to_string(),
                        phase_source: info.phase.clone(),
                    },
                ) else {
                    // A rule produced an out-of-range confidence; that is a
                    // bug in the rule table, not in the observation.
                    debug_assert!(false, "rule {} produced invalid confidence", rule.name);
                    continue;
                };
                edges.push(edge);
            }
        }

        edges
    }

    /// Register an observed resource: validate, upsert the node and its
    /// catalog record, then infer and persist relationship edges.
    ///
    /// Edges are applied to the in-memory graph first and rolled back if
    /// catalog persistence fails. Edges whose target is not yet in the
    /// graph are still persisted; the graph picks them up on the next
    /// rebuild once the target is observed.
    ///
    /// # Errors
    ///
    /// - [`crate::error::Error::InvalidResourceRecord`] if mandatory
    ///   fields are missing.
    /// - [`crate::error::Error::StorageUnavailable`] if the node's record
    ///   write fails; the in-memory node change is rolled back first.
    pub async fn register_resource(
        &self,
        graph: &Arc<RwLock<DependencyGraph>>,
        catalog: &mut dyn ResourceCatalog,
        info: ResourceInfo,
    ) -> Result<RegistrationReport> {
        info.validate()?;

        let id = ResourceId::new(info.resource_id.clone());
        let now = Utc::now();

        // Read the durable record first: if the catalog is unreachable the
        // in-memory graph is left untouched.
        let existing = catalog.get(&id).await?;

        // Snapshot for rollback, then apply the node in-memory.
        let prior = {
            let graph = graph.read().await;
            graph.attrs_of(&id).cloned()
        };

        let mut node_state = {
            let mut graph = graph.write().await;
            graph.add_node(id.clone(), info.resource_type.clone(), info.phase.clone())
        };

        // A record the catalog remembers as deleted means this observation
        // is a new incarnation: it re-enters the lifecycle at Unknown even
        // when the graph no longer holds the old node.
        let reentry = matches!(&existing, Some(r) if r.state == ResourceState::Deleted);
        if reentry && node_state != ResourceState::Unknown {
            let mut graph = graph.write().await;
            graph.restore_node(
                id.clone(),
                info.resource_type.clone(),
                info.phase.clone(),
                ResourceState::Unknown,
            );
            node_state = ResourceState::Unknown;
        }

        let record = match existing {
            Some(mut record) if record.state != ResourceState::Deleted => {
                record.resource_type = info.resource_type.clone();
                record.phase = info.phase.clone();
                record.metadata = info.metadata.clone();
                record.state = node_state;
                record.last_seen = now;
                record
            }
            _ => {
                // Fresh record, or a new incarnation of a deleted ID.
                let mut record: ResourceRecord = info.clone().into_record(now);
                record.state = node_state;
                record
            }
        };

        if let Err(error) = catalog.put(record).await {
            // Roll back the in-memory node so the cache stays consistent
            // with the system of record.
            let mut graph = graph.write().await;
            match prior {
                Some(attrs) => {
                    graph.restore_node(id.clone(), attrs.resource_type, attrs.phase, attrs.state);
                }
                None => {
                    graph.remove_resource(&id);
                }
            }
            return Err(error);
        }

        let inferred = self.infer_dependencies(&info);
        let mut report = RegistrationReport {
            resource_id: id,
            node_written: true,
            edges_applied: Vec::new(),
            edges_failed: Vec::new(),
        };

        for edge in inferred {
            let applied_in_memory = {
                let mut graph = graph.write().await;
                graph.add_dependency(&edge.source_id, &edge.target_id, EdgeInfo::from(&edge))
            };

            match catalog.add_relationship(edge.clone()).await {
                Ok(_) => report.edges_applied.push(edge),
                Err(error) => {
                    if applied_in_memory {
                        let mut graph = graph.write().await;
                        graph.remove_dependency(
                            &edge.source_id,
                            &edge.target_id,
                            &edge.relationship_type,
                        );
                    }
                    tracing::warn!(
                        source = %edge.source_id,
                        target = %edge.target_id,
                        error = %error,
                        "failed to persist inferred relationship"
                    );
                    report.edges_failed.push((edge, error.to_string()));
                }
            }
        }

        Ok(report)
    }
}

fn short_type(resource_type: &str) -> &str {
    resource_type
        .rsplit("::")
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(resource_type)
}

fn split_ids(value: &str) -> Vec<ResourceId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ResourceId::new)
        .collect()
}

fn metadata_targets(
    info: &ResourceInfo,
    key: &str,
    suffix: &str,
    confidence: f64,
) -> Vec<InferredTarget> {
    let Some(value) = info.metadata.get(key) else {
        return Vec::new();
    };
    split_ids(value)
        .into_iter()
        .map(|target_id| InferredTarget {
            target_id,
            relationship_type: format!("{}_{}", short_type(&info.resource_type), suffix),
            confidence,
            explicit: false,
        })
        .collect()
}

/// The default inference rule table, in evaluation order.
///
/// Confidence values are deliberate constants (see the `CONFIDENCE_*`
/// items) rather than learned thresholds.
#[must_use]
pub fn default_rules() -> Vec<InferenceRule> {
    vec![
        InferenceRule {
            name: "explicit_depends_on",
            applies: |info| info.metadata.contains_key("depends_on"),
            infer: |info| {
                let Some(value) = info.metadata.get("depends_on") else {
                    return Vec::new();
                };
                split_ids(value)
                    .into_iter()
                    .map(|target_id| InferredTarget {
                        target_id,
                        relationship_type: "depends_on".to_string(),
                        confidence: CONFIDENCE_EXPLICIT,
                        explicit: true,
                    })
                    .collect()
            },
        },
        InferenceRule {
            name: "vpc_reference",
            applies: |info| info.metadata.contains_key("vpc_id"),
            infer: |info| metadata_targets(info, "vpc_id", "vpc", CONFIDENCE_ID_REFERENCE),
        },
        InferenceRule {
            name: "subnet_reference",
            applies: |info| {
                info.metadata.contains_key("subnet_id") || info.metadata.contains_key("subnet_ids")
            },
            infer: |info| {
                let mut targets =
                    metadata_targets(info, "subnet_id", "subnet", CONFIDENCE_ID_REFERENCE);
                targets.extend(metadata_targets(
                    info,
                    "subnet_ids",
                    "subnet",
                    CONFIDENCE_ID_REFERENCE,
                ));
                targets
            },
        },
        InferenceRule {
            name: "security_group_attachment",
            applies: |info| info.metadata.contains_key("security_group_ids"),
            infer: |info| {
                metadata_targets(
                    info,
                    "security_group_ids",
                    "security_group",
                    CONFIDENCE_ATTACHMENT,
                )
            },
        },
        InferenceRule {
            name: "cluster_membership",
            applies: |info| info.metadata.contains_key("cluster"),
            infer: |info| metadata_targets(info, "cluster", "cluster", CONFIDENCE_ATTACHMENT),
        },
        InferenceRule {
            name: "kms_key_reference",
            applies: |info| info.metadata.contains_key("kms_key_id"),
            infer: |info| metadata_targets(info, "kms_key_id", "kms_key", CONFIDENCE_ATTACHMENT),
        },
        InferenceRule {
            name: "load_balancer_hint",
            applies: |info| info.metadata.contains_key("load_balancer"),
            infer: |info| {
                metadata_targets(info, "load_balancer", "load_balancer", CONFIDENCE_NAME_HINT)
            },
        },
        InferenceRule {
            name: "role_hint",
            applies: |info| info.metadata.contains_key("role"),
            infer: |info| metadata_targets(info, "role", "role", CONFIDENCE_NAME_HINT),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn observation(id: &str, resource_type: &str, metadata: &[(&str, &str)]) -> ResourceInfo {
        ResourceInfo {
            resource_id: id.to_string(),
            resource_type: resource_type.to_string(),
            phase: Some("net".to_string()),
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn vpc_rule_infers_typed_edge() {
        let populator = GraphPopulator::default();
        let info = observation("subnet-1", "network::subnet", &[("vpc_id", "vpc-1")]);

        let edges = populator.infer_dependencies(&info);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id.as_str(), "vpc-1");
        assert_eq!(edges[0].relationship_type, "subnet_vpc");
        assert!((edges[0].confidence - CONFIDENCE_ID_REFERENCE).abs() < f64::EPSILON);
        assert!(edges[0].provenance.auto_detected);
        assert_eq!(edges[0].provenance.detection_method, "vpc_reference");
        assert_eq!(edges[0].provenance.phase_source.as_deref(), Some("net"));
    }

    #[test]
    fn explicit_depends_on_wins_full_confidence() {
        let populator = GraphPopulator::default();
        let info = observation(
            "svc-1",
            "compute::service",
            &[("depends_on", "db-1, cache-1")],
        );

        let edges = populator.infer_dependencies(&info);
        assert_eq!(edges.len(), 2);
        for edge in &edges {
            assert!((edge.confidence - CONFIDENCE_EXPLICIT).abs() < f64::EPSILON);
            assert!(!edge.provenance.auto_detected);
        }
        assert_eq!(edges[0].target_id.as_str(), "db-1");
        assert_eq!(edges[1].target_id.as_str(), "cache-1");
    }

    #[test]
    fn list_valued_fields_fan_out() {
        let populator = GraphPopulator::default();
        let info = observation(
            "svc-1",
            "compute::service",
            &[
                ("subnet_ids", "subnet-1,subnet-2"),
                ("security_group_ids", "sg-1"),
            ],
        );

        let edges = populator.infer_dependencies(&info);
        let rels: Vec<&str> = edges.iter().map(|e| e.relationship_type.as_str()).collect();
        assert_eq!(
            rels,
            vec!["service_subnet", "service_subnet", "service_security_group"]
        );
    }

    #[test]
    fn self_references_are_dropped() {
        let populator = GraphPopulator::default();
        let info = observation("vpc-1", "network::vpc", &[("vpc_id", "vpc-1")]);
        assert!(populator.infer_dependencies(&info).is_empty());
    }

    #[test]
    fn infer_is_pure() {
        let populator = GraphPopulator::default();
        let info = observation("subnet-1", "network::subnet", &[("vpc_id", "vpc-1")]);

        let first = populator.infer_dependencies(&info);
        let second = populator.infer_dependencies(&info);
        assert_eq!(first, second);
    }

    #[test]
    fn short_type_strips_namespace() {
        assert_eq!(short_type("network::subnet"), "subnet");
        assert_eq!(short_type("service"), "service");
        assert_eq!(short_type("a::b::c"), "c");
    }

    #[tokio::test]
    async fn register_resource_validates_input() {
        let populator = GraphPopulator::default();
        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let mut catalog = crate::catalog::new_in_memory_catalog();

        let result = populator
            .register_resource(&graph, catalog.as_mut(), ResourceInfo::default())
            .await;
        assert!(matches!(
            result,
            Err(crate::error::Error::InvalidResourceRecord(_))
        ));
    }

    #[tokio::test]
    async fn register_resource_writes_node_and_edges() {
        let populator = GraphPopulator::default();
        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let mut catalog = crate::catalog::new_in_memory_catalog();

        // Register the VPC first so the subnet's edge attaches in-memory.
        populator
            .register_resource(
                &graph,
                catalog.as_mut(),
                observation("vpc-1", "network::vpc", &[]),
            )
            .await
            .unwrap();

        let report = populator
            .register_resource(
                &graph,
                catalog.as_mut(),
                observation("subnet-1", "network::subnet", &[("vpc_id", "vpc-1")]),
            )
            .await
            .unwrap();

        assert!(report.fully_applied());
        assert_eq!(report.edges_applied.len(), 1);

        let graph = graph.read().await;
        assert_eq!(
            graph.dependencies_of(&ResourceId::new("subnet-1")).len(),
            1
        );
        drop(graph);

        let stored = catalog
            .dependencies(&ResourceId::new("subnet-1"))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].target_id.as_str(), "vpc-1");
    }

    #[tokio::test]
    async fn edge_to_unobserved_target_is_persisted_not_graphed() {
        let populator = GraphPopulator::default();
        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let mut catalog = crate::catalog::new_in_memory_catalog();

        let report = populator
            .register_resource(
                &graph,
                catalog.as_mut(),
                observation("subnet-1", "network::subnet", &[("vpc_id", "vpc-9")]),
            )
            .await
            .unwrap();

        // Persisted for the next rebuild, but not attached in-memory.
        assert_eq!(report.edges_applied.len(), 1);
        let graph = graph.read().await;
        assert!(graph.dependencies_of(&ResourceId::new("subnet-1")).is_empty());
        drop(graph);
        assert_eq!(catalog.relationships().await.unwrap().len(), 1);
    }
}
