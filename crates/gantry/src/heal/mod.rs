//! Drift classification and auto-heal execution.
//!
//! Classification is a pure, total function of `(drift_type,
//! resource_type)` driven by a [`HealPolicy`]: a fixed always-safe set, a
//! conditionally-safe set gated on a resource-type allow-list, and a
//! fail-closed default: unknown drift types are never auto-healed.
//!
//! Remediation itself happens behind the [`HealHandler`] trait, the only
//! place this engine touches the resource control plane. Handlers are
//! idempotent and independently substitutable, so the engine can be tested
//! end to end without a cloud account.

use crate::catalog::ResourceCatalog;
use crate::domain::{DriftFinding, ResourceId, ResourceState};
use crate::graph::DependencyGraph;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default severity assigned to drift types without an explicit weight,
/// including unknown ones.
pub const DEFAULT_SEVERITY: u8 = 8;

/// Classification verdict for a drift finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    /// Auto-remediable without human review.
    Safe,

    /// Requires human approval before any change is applied.
    Risky,
}

/// Classification policy: which drift is safe to heal automatically.
///
/// The sets and weights are deliberately configuration, not code, so
/// operators can tune them per fleet (the defaults below are the shipped
/// constants). Serialization lets the policy ride in the project config
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealPolicy {
    /// Drift types that are always safe to auto-heal.
    pub always_safe: BTreeSet<String>,

    /// Resource types for which `encryption_disabled` is safe to heal
    /// (enabling encryption is additive for these types).
    pub encryption_safe_types: BTreeSet<String>,

    /// Severity weight per drift type, used to rank approval queues.
    pub severity_weights: BTreeMap<String, u8>,
}

impl Default for HealPolicy {
    fn default() -> Self {
        Self {
            always_safe: [
                "tag_missing",
                "backup_disabled",
                "monitoring_disabled",
                "lifecycle_missing",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            encryption_safe_types: ["storage::bucket", "storage::volume"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            severity_weights: [
                ("tag_missing", 1),
                ("lifecycle_missing", 1),
                ("monitoring_disabled", 2),
                ("backup_disabled", 3),
                ("encryption_disabled", 5),
                ("security_group_changed", 8),
                ("resource_deleted", 10),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        }
    }
}

impl HealPolicy {
    /// Classify a drift finding.
    ///
    /// Pure and total: the same inputs always produce the same verdict,
    /// and anything not covered by the policy sets is `Risky`.
    #[must_use]
    pub fn classify(&self, drift_type: &str, resource_type: &str) -> DriftClass {
        if self.always_safe.contains(drift_type) {
            return DriftClass::Safe;
        }
        if drift_type == "encryption_disabled" && self.encryption_safe_types.contains(resource_type)
        {
            return DriftClass::Safe;
        }
        DriftClass::Risky
    }

    /// Severity weight for a drift type; unknown types get
    /// [`DEFAULT_SEVERITY`].
    #[must_use]
    pub fn severity(&self, drift_type: &str) -> u8 {
        self.severity_weights
            .get(drift_type)
            .copied()
            .unwrap_or(DEFAULT_SEVERITY)
    }
}

/// A single remediation to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealAction {
    /// The drifted resource.
    pub resource_id: ResourceId,

    /// Taxonomy string of the resource.
    pub resource_type: String,

    /// The drift being remediated.
    pub drift_type: String,

    /// Severity weight from the policy.
    pub severity: u8,
}

/// Result of one handler invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HealOutcome {
    /// The handler converged the resource to its desired state.
    Healed {
        /// Handler-provided description of what was applied.
        detail: String,
    },

    /// The handler could not remediate.
    Failed {
        /// Handler-provided error text.
        error: String,
    },
}

impl HealOutcome {
    /// Whether the outcome is a successful heal.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, HealOutcome::Healed { .. })
    }
}

/// The control-plane collaborator boundary.
///
/// A handler remediates exactly one drift type. Implementations must be
/// **idempotent**: applying the same action twice yields the same end
/// state. The engine never talks to the control plane except through this
/// trait.
#[async_trait]
pub trait HealHandler: Send + Sync {
    /// Remediate the given action.
    async fn heal(&self, action: &HealAction) -> HealOutcome;
}

/// Result of classifying a batch of drift findings.
#[derive(Debug, Clone, Serialize)]
pub struct DriftAnalysis {
    /// Findings classified safe.
    pub safe_drifts: Vec<DriftFinding>,

    /// Findings requiring human approval.
    pub risky_drifts: Vec<DriftFinding>,

    /// Actions ready for [`AutoHealEngine::execute_auto_heal`].
    pub auto_heal_actions: Vec<HealAction>,

    /// Actions that must go through an approval workflow instead.
    pub approval_required: Vec<HealAction>,
}

/// One attempted heal and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct HealRecord {
    /// The attempted action.
    pub action: HealAction,

    /// What the handler (or the engine, on timeout) reported.
    pub outcome: HealOutcome,
}

/// Aggregated result of a heal batch.
///
/// The engine continues past individual failures; this report is the
/// partial-failure accounting, not a transaction receipt.
#[derive(Debug, Clone, Serialize)]
pub struct HealReport {
    /// Actions that healed.
    pub successful_heals: Vec<HealRecord>,

    /// Actions that failed or were cut off by the batch timeout.
    pub failed_heals: Vec<HealRecord>,

    /// Total actions submitted.
    pub total_actions: usize,
}

/// Classifies drift findings and drives idempotent remediation handlers.
pub struct AutoHealEngine {
    policy: HealPolicy,
    handlers: HashMap<String, Arc<dyn HealHandler>>,
}

impl AutoHealEngine {
    /// Create an engine with the given policy and no handlers.
    #[must_use]
    pub fn new(policy: HealPolicy) -> Self {
        Self {
            policy,
            handlers: HashMap::new(),
        }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &HealPolicy {
        &self.policy
    }

    /// Register the handler responsible for a drift type.
    ///
    /// Replaces any previous handler for the same type.
    pub fn register_handler(&mut self, drift_type: impl Into<String>, handler: Arc<dyn HealHandler>) {
        self.handlers.insert(drift_type.into(), handler);
    }

    /// Classify a batch of findings and mark the affected nodes drifted.
    ///
    /// Findings are consumed by value, so each finding is processed exactly
    /// once. Findings for resources the graph does not know are still
    /// classified; the node transition is skipped with a warning.
    pub async fn analyze_drift(
        &self,
        graph: &Arc<RwLock<DependencyGraph>>,
        findings: Vec<DriftFinding>,
    ) -> DriftAnalysis {
        let mut analysis = DriftAnalysis {
            safe_drifts: Vec::new(),
            risky_drifts: Vec::new(),
            auto_heal_actions: Vec::new(),
            approval_required: Vec::new(),
        };

        let mut graph = graph.write().await;
        for finding in findings {
            if !graph.mark_drift(&finding.resource_id) {
                tracing::warn!(
                    resource = %finding.resource_id,
                    drift_type = %finding.drift_type,
                    "drift finding for resource not tracked in graph"
                );
            }

            let action = HealAction {
                resource_id: finding.resource_id.clone(),
                resource_type: finding.resource_type.clone(),
                drift_type: finding.drift_type.clone(),
                severity: self.policy.severity(&finding.drift_type),
            };

            match self.policy.classify(&finding.drift_type, &finding.resource_type) {
                DriftClass::Safe => {
                    analysis.auto_heal_actions.push(action);
                    analysis.safe_drifts.push(finding);
                }
                DriftClass::Risky => {
                    analysis.approval_required.push(action);
                    analysis.risky_drifts.push(finding);
                }
            }
        }

        // Highest severity first in the approval queue.
        analysis
            .approval_required
            .sort_by(|a, b| b.severity.cmp(&a.severity).then(a.resource_id.cmp(&b.resource_id)));

        analysis
    }

    /// Execute a batch of heal actions.
    ///
    /// Each action's handler is invoked in turn; individual failures are
    /// recorded and the batch continues. When `timeout` is supplied it
    /// bounds the whole batch: actions that don't get to run are reported
    /// as failed with a timeout error, so the partial state is fully
    /// accounted for.
    ///
    /// Successful heals transition the node `Drift -> Healthy` and archive
    /// the outcome on the catalog record.
    pub async fn execute_auto_heal(
        &self,
        graph: &Arc<RwLock<DependencyGraph>>,
        catalog: &mut dyn ResourceCatalog,
        actions: Vec<HealAction>,
        timeout: Option<Duration>,
    ) -> HealReport {
        let total_actions = actions.len();
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut report = HealReport {
            successful_heals: Vec::new(),
            failed_heals: Vec::new(),
            total_actions,
        };

        for action in actions {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        report.failed_heals.push(HealRecord {
                            action,
                            outcome: HealOutcome::Failed {
                                error: "batch timeout exceeded before action ran".to_string(),
                            },
                        });
                        continue;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let Some(handler) = self.handlers.get(&action.drift_type) else {
                tracing::warn!(
                    drift_type = %action.drift_type,
                    resource = %action.resource_id,
                    "no heal handler registered"
                );
                report.failed_heals.push(HealRecord {
                    outcome: HealOutcome::Failed {
                        error: format!("no handler registered for '{}'", action.drift_type),
                    },
                    action,
                });
                continue;
            };

            let outcome = match remaining {
                Some(remaining) => match tokio::time::timeout(remaining, handler.heal(&action)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => HealOutcome::Failed {
                        error: "batch timeout exceeded during heal".to_string(),
                    },
                },
                None => handler.heal(&action).await,
            };

            if outcome.is_success() {
                self.archive_success(graph, catalog, &action, &outcome).await;
                report.successful_heals.push(HealRecord { action, outcome });
            } else {
                tracing::warn!(
                    resource = %action.resource_id,
                    drift_type = %action.drift_type,
                    "heal action failed"
                );
                report.failed_heals.push(HealRecord { action, outcome });
            }
        }

        report
    }

    /// Mark the node healthy and archive the remediation outcome on the
    /// catalog record.
    ///
    /// The control-plane change already happened, so an archival failure
    /// is logged rather than rolled back; the next catalog sync repairs
    /// the record.
    async fn archive_success(
        &self,
        graph: &Arc<RwLock<DependencyGraph>>,
        catalog: &mut dyn ResourceCatalog,
        action: &HealAction,
        outcome: &HealOutcome,
    ) {
        {
            let mut graph = graph.write().await;
            graph.mark_healthy(&action.resource_id);
        }

        let archived = async {
            let Some(mut record) = catalog.get(&action.resource_id).await? else {
                return Ok::<bool, crate::error::Error>(false);
            };
            record.state = ResourceState::Healthy;
            record
                .metadata
                .insert("last_drift_type".to_string(), action.drift_type.clone());
            if let HealOutcome::Healed { detail } = outcome {
                record
                    .metadata
                    .insert("last_heal_outcome".to_string(), detail.clone());
            }
            record.last_seen = chrono::Utc::now();
            catalog.put(record).await?;
            Ok(true)
        }
        .await;

        match archived {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(resource = %action.resource_id, "healed resource has no catalog record");
            }
            Err(error) => {
                tracing::warn!(
                    resource = %action.resource_id,
                    error = %error,
                    "failed to archive heal outcome"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::tag("tag_missing", "storage::bucket", DriftClass::Safe)]
    #[case::backup("backup_disabled", "database::instance", DriftClass::Safe)]
    #[case::monitoring("monitoring_disabled", "compute::service", DriftClass::Safe)]
    #[case::lifecycle("lifecycle_missing", "storage::bucket", DriftClass::Safe)]
    #[case::encryption_allowed("encryption_disabled", "storage::bucket", DriftClass::Safe)]
    #[case::encryption_blocked("encryption_disabled", "database::instance", DriftClass::Risky)]
    #[case::sg_change("security_group_changed", "network::security_group", DriftClass::Risky)]
    #[case::deleted("resource_deleted", "compute::service", DriftClass::Risky)]
    #[case::unknown("totally_new_drift", "compute::service", DriftClass::Risky)]
    #[case::empty("", "compute::service", DriftClass::Risky)]
    fn classification_table(
        #[case] drift_type: &str,
        #[case] resource_type: &str,
        #[case] expected: DriftClass,
    ) {
        let policy = HealPolicy::default();
        assert_eq!(policy.classify(drift_type, resource_type), expected);
    }

    #[test]
    fn classification_is_deterministic() {
        let policy = HealPolicy::default();
        for _ in 0..3 {
            assert_eq!(
                policy.classify("tag_missing", "storage::bucket"),
                DriftClass::Safe
            );
            assert_eq!(
                policy.classify("mystery_drift", "storage::bucket"),
                DriftClass::Risky
            );
        }
    }

    #[test]
    fn unknown_severity_uses_default() {
        let policy = HealPolicy::default();
        assert_eq!(policy.severity("resource_deleted"), 10);
        assert_eq!(policy.severity("mystery_drift"), DEFAULT_SEVERITY);
    }

    #[test]
    fn policy_is_configurable() {
        let mut policy = HealPolicy::default();
        policy.always_safe.insert("mystery_drift".to_string());
        assert_eq!(
            policy.classify("mystery_drift", "compute::service"),
            DriftClass::Safe
        );
    }
}
