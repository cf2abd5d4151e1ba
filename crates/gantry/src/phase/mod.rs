//! Phase deletion planning and execution.
//!
//! A phase is a named logical group of resources deployed and deleted
//! together. Deletion is the one irreversible operation in the engine, so
//! it is split into a pure planning step (blocking-dependency detection +
//! ordering) and an execution step that walks the plan one resource at a
//! time through a [`ResourceDeleter`] collaborator.
//!
//! Blocking works on catalog data, not the in-memory graph: the catalog is
//! the system of record, and a dependent that only exists in a stale cache
//! must not be able to veto (or wave through) a deletion.

use crate::catalog::ResourceCatalog;
use crate::domain::{ResourceFilter, ResourceId, ResourceRecord, ResourceState};
use crate::error::Result;
use crate::graph::{CycleWarning, DependencyGraph};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How long a soft-deleted record is kept before the backing store may
/// reclaim it.
pub const DELETED_RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// An external dependency that blocks a phase deletion.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingDependency {
    /// The phase member being depended upon.
    pub resource_id: ResourceId,

    /// The resource outside the phase that depends on it.
    pub dependent_id: ResourceId,

    /// Relationship taxonomy of the blocking edge.
    pub relationship_type: String,
}

/// Summary used by CLIs to render a confirmation prompt before deleting.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseInfo {
    /// The phase name.
    pub phase: String,

    /// Number of live (non-deleted) resources in the phase.
    pub resource_count: usize,

    /// The live resources, ascending by ID.
    pub resources: Vec<ResourceId>,

    /// Whether deletion would proceed without `force`.
    pub safe_to_delete: bool,

    /// External dependencies that would block deletion.
    pub blocking: Vec<BlockingDependency>,
}

/// An ordered deletion plan: dependents before dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionPlan {
    /// The phase name.
    pub phase: String,

    /// Deletion order (reverse of the healing order).
    pub order: Vec<ResourceId>,

    /// Cycle warnings surfaced while ordering.
    pub warnings: Vec<CycleWarning>,
}

/// Result of the planning step.
#[derive(Debug, Clone, Serialize)]
pub enum DeletionPlanOutcome {
    /// External dependents exist and `force` was false. Returned, not
    /// thrown, so orchestration can surface the list to a human.
    Blocked {
        /// The blocking dependencies, one entry per external edge.
        blocking: Vec<BlockingDependency>,
    },

    /// Safe (or forced) to proceed in the given order.
    Planned(DeletionPlan),
}

/// Result of one deleter invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The resource is gone (or confirmed absent).
    Deleted {
        /// Collaborator-provided description.
        detail: String,
    },

    /// The resource could not be deleted.
    Failed {
        /// Collaborator-provided error text.
        error: String,
    },
}

impl DeleteOutcome {
    /// Whether the outcome is a successful deletion.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }
}

/// The control-plane collaborator that physically removes resources.
///
/// The engine only ever requests deletions through this trait, so hosts
/// decide what "delete" means: a cloud API call, a ticket, or pure
/// bookkeeping.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// Delete the given resource.
    async fn delete(&self, record: &ResourceRecord) -> DeleteOutcome;
}

/// Bookkeeping-only deleter used by the CLI host.
///
/// Physical teardown belongs to an external orchestration collaborator;
/// this deleter acknowledges every request so the catalog soft-delete and
/// graph cleanup proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookkeepingDeleter;

#[async_trait]
impl ResourceDeleter for BookkeepingDeleter {
    async fn delete(&self, record: &ResourceRecord) -> DeleteOutcome {
        DeleteOutcome::Deleted {
            detail: format!("{} removed from catalog bookkeeping", record.id),
        }
    }
}

/// Execution report for a phase deletion.
///
/// Partial states are explicit: every phase member lands in exactly one of
/// `deleted`, `failed`, or `skipped`.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseDeletionReport {
    /// The phase name.
    pub phase: String,

    /// Resources soft-deleted, in deletion order.
    pub deleted: Vec<ResourceId>,

    /// Resources whose deletion failed, with the error text.
    pub failed: Vec<(ResourceId, String)>,

    /// Resources not attempted (stop-on-first-failure or batch timeout).
    pub skipped: Vec<ResourceId>,

    /// Cycle warnings surfaced while ordering.
    pub warnings: Vec<CycleWarning>,
}

/// Result of [`PhaseDeletionManager::delete_phase`].
#[derive(Debug, Clone, Serialize)]
pub enum PhaseDeletionOutcome {
    /// Refused without deleting anything.
    Blocked {
        /// The blocking dependencies.
        blocking: Vec<BlockingDependency>,
    },

    /// Executed, fully or partially.
    Executed(PhaseDeletionReport),
}

/// Computes dependency-respecting deletion plans and executes them.
pub struct PhaseDeletionManager {
    graph: Arc<RwLock<DependencyGraph>>,
}

impl PhaseDeletionManager {
    /// Create a manager over a shared graph.
    #[must_use]
    pub fn new(graph: Arc<RwLock<DependencyGraph>>) -> Self {
        Self { graph }
    }

    /// Live members of a phase, ascending by ID.
    async fn phase_members(
        catalog: &dyn ResourceCatalog,
        phase: &str,
    ) -> Result<Vec<ResourceRecord>> {
        let records = catalog
            .list(&ResourceFilter {
                phase: Some(phase.to_string()),
                ..Default::default()
            })
            .await?;
        Ok(records
            .into_iter()
            .filter(|record| record.state != ResourceState::Deleted)
            .collect())
    }

    /// Find dependents outside the phase for every member.
    ///
    /// Soft-deleted dependents don't block: a record kept only for history
    /// has no claim on its dependencies.
    async fn find_blocking(
        catalog: &dyn ResourceCatalog,
        members: &[ResourceRecord],
    ) -> Result<Vec<BlockingDependency>> {
        let member_set: BTreeSet<&ResourceId> = members.iter().map(|r| &r.id).collect();
        let mut blocking = Vec::new();

        for member in members {
            for edge in catalog.dependents(&member.id).await? {
                if member_set.contains(&edge.source_id) {
                    continue;
                }
                let dependent_deleted = matches!(
                    catalog.get(&edge.source_id).await?,
                    Some(record) if record.state == ResourceState::Deleted
                );
                if dependent_deleted {
                    continue;
                }
                blocking.push(BlockingDependency {
                    resource_id: member.id.clone(),
                    dependent_id: edge.source_id.clone(),
                    relationship_type: edge.relationship_type.clone(),
                });
            }
        }

        blocking.sort_by(|a, b| {
            a.resource_id
                .cmp(&b.resource_id)
                .then_with(|| a.dependent_id.cmp(&b.dependent_id))
        });
        Ok(blocking)
    }

    /// Confirmation-prompt data for a phase.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be read.
    pub async fn get_phase_info(
        &self,
        catalog: &dyn ResourceCatalog,
        phase: &str,
    ) -> Result<PhaseInfo> {
        let members = Self::phase_members(catalog, phase).await?;
        let blocking = Self::find_blocking(catalog, &members).await?;

        Ok(PhaseInfo {
            phase: phase.to_string(),
            resource_count: members.len(),
            resources: members.iter().map(|r| r.id.clone()).collect(),
            safe_to_delete: blocking.is_empty(),
            blocking,
        })
    }

    /// Compute a deletion plan for a phase.
    ///
    /// When `force` is false, any dependent outside the phase blocks the
    /// whole plan; partial deletion of a phase with live external
    /// consumers is never offered. The order is the reverse of the healing
    /// order: dependents go before their dependencies.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be read.
    pub async fn plan_phase_deletion(
        &self,
        catalog: &dyn ResourceCatalog,
        phase: &str,
        force: bool,
    ) -> Result<DeletionPlanOutcome> {
        let members = Self::phase_members(catalog, phase).await?;

        if !force {
            let blocking = Self::find_blocking(catalog, &members).await?;
            if !blocking.is_empty() {
                return Ok(DeletionPlanOutcome::Blocked { blocking });
            }
        }

        let member_ids: Vec<ResourceId> = members.iter().map(|r| r.id.clone()).collect();
        let graph = self.graph.read().await;
        let healing = graph.get_healing_order(Some(&member_ids));
        drop(graph);

        // Reverse healing order: delete leaves of the dependent graph
        // first. Members the graph doesn't know carry no ordering
        // constraints and go last.
        let mut order: Vec<ResourceId> = healing.order.into_iter().rev().collect();
        let ordered: BTreeSet<&ResourceId> = order.iter().collect();
        let mut unordered: Vec<ResourceId> = member_ids
            .iter()
            .filter(|id| !ordered.contains(id))
            .cloned()
            .collect();
        unordered.sort();
        order.extend(unordered);

        Ok(DeletionPlanOutcome::Planned(DeletionPlan {
            phase: phase.to_string(),
            order,
            warnings: healing.warnings,
        }))
    }

    /// Delete a phase.
    ///
    /// Walks the plan one resource at a time through `deleter`, stopping
    /// at the first failure unless `force`. Each successful deletion is
    /// immediately soft-deleted in the catalog (state `Deleted`, TTL
    /// stamped), its relationships removed, and its node dropped from the
    /// graph, so a partial run leaves every resource in a well-defined
    /// state. `timeout` bounds the whole batch; resources that don't get a
    /// turn are reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be read while
    /// planning. Individual deletion failures are reported in the outcome,
    /// not raised.
    pub async fn delete_phase(
        &self,
        catalog: &mut dyn ResourceCatalog,
        deleter: &dyn ResourceDeleter,
        phase: &str,
        force: bool,
        timeout: Option<Duration>,
    ) -> Result<PhaseDeletionOutcome> {
        let plan = match self.plan_phase_deletion(catalog, phase, force).await? {
            DeletionPlanOutcome::Blocked { blocking } => {
                return Ok(PhaseDeletionOutcome::Blocked { blocking });
            }
            DeletionPlanOutcome::Planned(plan) => plan,
        };

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut report = PhaseDeletionReport {
            phase: phase.to_string(),
            deleted: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            warnings: plan.warnings,
        };

        let mut order = plan.order.into_iter();
        while let Some(id) = order.next() {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        report.skipped.push(id);
                        report.skipped.extend(order);
                        tracing::warn!(phase, "phase deletion stopped by batch timeout");
                        break;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let Some(record) = catalog.get(&id).await? else {
                tracing::warn!(resource = %id, "phase member disappeared before deletion");
                report.skipped.push(id);
                continue;
            };

            let outcome = match remaining {
                Some(remaining) => {
                    match tokio::time::timeout(remaining, deleter.delete(&record)).await {
                        Ok(outcome) => outcome,
                        Err(_) => DeleteOutcome::Failed {
                            error: "batch timeout exceeded during delete".to_string(),
                        },
                    }
                }
                None => deleter.delete(&record).await,
            };

            match outcome {
                DeleteOutcome::Deleted { .. } => {
                    self.soft_delete(catalog, &id).await?;
                    report.deleted.push(id);
                }
                DeleteOutcome::Failed { error } => {
                    tracing::warn!(resource = %id, error = %error, "phase member deletion failed");
                    report.failed.push((id, error));
                    if !force {
                        report.skipped.extend(order);
                        break;
                    }
                }
            }
        }

        Ok(PhaseDeletionOutcome::Executed(report))
    }

    /// Soft-delete bookkeeping for one confirmed deletion: the record is
    /// kept (state `Deleted`, TTL stamped) while its relationships and
    /// graph node go away.
    async fn soft_delete(&self, catalog: &mut dyn ResourceCatalog, id: &ResourceId) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(DELETED_RECORD_TTL)
                .expect("TTL constant fits chrono range");
        catalog
            .update_state(id, ResourceState::Deleted, Some(expires_at))
            .await?;
        catalog.remove_relationships(id).await?;

        let mut graph = self.graph.write().await;
        graph.mark_deleted(id);
        graph.remove_resource(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bookkeeping_deleter_always_succeeds() {
        let record = crate::domain::ResourceInfo {
            resource_id: "vpc-1".to_string(),
            resource_type: "network::vpc".to_string(),
            ..Default::default()
        }
        .into_record(Utc::now());

        let outcome = BookkeepingDeleter.delete(&record).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn empty_phase_plans_empty_order() {
        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let manager = PhaseDeletionManager::new(graph);
        let catalog = crate::catalog::new_in_memory_catalog();

        let outcome = manager
            .plan_phase_deletion(catalog.as_ref(), "ghost-phase", false)
            .await
            .unwrap();
        match outcome {
            DeletionPlanOutcome::Planned(plan) => assert!(plan.order.is_empty()),
            DeletionPlanOutcome::Blocked { .. } => panic!("empty phase cannot be blocked"),
        }
    }
}
