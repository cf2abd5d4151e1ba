//! Domain types for resource tracking and drift reconciliation.
//!
//! This module contains the core entities shared by every component: the
//! durable resource record, the discovery input shape, relationship edges
//! with provenance, and drift findings. All of them are closed structs with
//! explicit fields; anything dynamic lives in the `metadata` maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Unique identifier for a provisioned resource.
///
/// Identifiers are assigned by the cloud control plane and treated as
/// opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a new resource ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a resource.
///
/// Transitions: `Unknown -> Healthy` on first successful catalog sync,
/// `Healthy -> Drift` on a drift finding, `Drift -> Healthy` on a
/// successful heal, and any state `-> Deleted` via phase deletion.
/// `Deleted` is terminal in place: a later observation of the same ID
/// re-enters the machine at `Unknown` rather than resurrecting the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Observed but not yet synced to the catalog.
    Unknown,

    /// Actual configuration matches the declared desired state.
    Healthy,

    /// Actual configuration has diverged from the desired state.
    Drift,

    /// Soft-deleted; kept in the catalog for history, terminal in place.
    Deleted,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Unknown => "unknown",
            ResourceState::Healthy => "healthy",
            ResourceState::Drift => "drift",
            ResourceState::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A resource record as stored in the catalog.
///
/// The catalog is the system of record; the in-memory dependency graph is
/// rebuilt from these records and never treated as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Globally unique resource identifier.
    pub id: ResourceId,

    /// Taxonomy string, e.g. "network::vpc" or "compute::service".
    pub resource_type: String,

    /// Current lifecycle state.
    pub state: ResourceState,

    /// Logical deployment group the resource belongs to.
    pub phase: Option<String>,

    /// Opaque key/value attributes used for inference and display.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// When the resource was first observed.
    pub first_seen: DateTime<Utc>,

    /// When the resource was last observed or mutated.
    pub last_seen: DateTime<Utc>,

    /// Optional expiry stamped when the record is soft-deleted, so the
    /// backing store can eventually reclaim it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A resource observation as produced by the discovery collaborator.
///
/// This is the input shape for [`crate::populate::GraphPopulator`]; no
/// transport is assumed, only the fields below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Globally unique resource identifier (mandatory).
    pub resource_id: String,

    /// Taxonomy string (mandatory).
    pub resource_type: String,

    /// Logical deployment group, if the collaborator knows it.
    #[serde(default)]
    pub phase: Option<String>,

    /// Declared attributes; inference rules read references out of this map.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ResourceInfo {
    /// Validate mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceRecord`] if `resource_id` or
    /// `resource_type` is empty.
    pub fn validate(&self) -> Result<()> {
        if self.resource_id.trim().is_empty() {
            return Err(Error::InvalidResourceRecord(
                "resource_id is mandatory".to_string(),
            ));
        }
        if self.resource_type.trim().is_empty() {
            return Err(Error::InvalidResourceRecord(format!(
                "resource_type is mandatory for resource '{}'",
                self.resource_id
            )));
        }
        Ok(())
    }

    /// Convert the observation into a fresh catalog record.
    ///
    /// New records start in [`ResourceState::Unknown`]; the catalog sync
    /// promotes them to `Healthy`.
    #[must_use]
    pub fn into_record(self, now: DateTime<Utc>) -> ResourceRecord {
        ResourceRecord {
            id: ResourceId::new(self.resource_id),
            resource_type: self.resource_type,
            state: ResourceState::Unknown,
            phase: self.phase,
            metadata: self.metadata,
            first_seen: now,
            last_seen: now,
            expires_at: None,
        }
    }
}

/// Provenance of a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProvenance {
    /// Whether the edge was inferred rather than explicitly declared.
    pub auto_detected: bool,

    /// Name of the inference rule or declaration that produced the edge.
    pub detection_method: String,

    /// Phase of the resource whose metadata produced the edge, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_source: Option<String>,
}

/// A directed relationship between two resources.
///
/// The edge means *source depends on target*: the target must exist (and
/// heal) before the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// The dependent resource.
    pub source_id: ResourceId,

    /// The resource being depended upon.
    pub target_id: ResourceId,

    /// Taxonomy string, e.g. "subnet_vpc" or "service_subnet".
    pub relationship_type: String,

    /// Confidence in [0, 1]; 1.0 for explicit references, lower for
    /// heuristic inference.
    pub confidence: f64,

    /// How and where the edge was detected.
    pub provenance: EdgeProvenance,
}

impl Edge {
    /// Construct an edge, validating the confidence range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceRecord`] if `confidence` is outside
    /// [0, 1] or not a finite number.
    pub fn new(
        source_id: ResourceId,
        target_id: ResourceId,
        relationship_type: impl Into<String>,
        confidence: f64,
        provenance: EdgeProvenance,
    ) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidResourceRecord(format!(
                "edge confidence must be in [0, 1], got {confidence}"
            )));
        }
        Ok(Self {
            source_id,
            target_id,
            relationship_type: relationship_type.into(),
            confidence,
            provenance,
        })
    }

    /// The identity of an edge for idempotence checks.
    ///
    /// Two edges with the same (source, target, relationship type) are the
    /// same relationship regardless of confidence or provenance.
    #[must_use]
    pub fn key(&self) -> (ResourceId, ResourceId, String) {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.relationship_type.clone(),
        )
    }
}

/// A drift finding produced by the drift-detection collaborator.
///
/// Findings are consumed exactly once by the auto-heal engine; their
/// remediation outcome is archived on the catalog record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftFinding {
    /// The drifted resource.
    pub resource_id: ResourceId,

    /// Taxonomy string of the drifted resource.
    pub resource_type: String,

    /// Open drift taxonomy, e.g. "tag_missing" or "security_group_changed".
    /// Unknown values are valid input and classify as risky.
    pub drift_type: String,

    /// Raw observed configuration payload.
    #[serde(default)]
    pub observed: serde_json::Value,

    /// Raw desired configuration payload.
    #[serde(default)]
    pub desired: serde_json::Value,
}

/// Filter for querying catalog records.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Filter by lifecycle state.
    pub state: Option<ResourceState>,

    /// Filter by deployment phase.
    pub phase: Option<String>,

    /// Filter by resource type.
    pub resource_type: Option<String>,

    /// Limit number of results.
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> EdgeProvenance {
        EdgeProvenance {
            auto_detected: true,
            detection_method: "test".to_string(),
            phase_source: None,
        }
    }

    #[test]
    fn resource_info_validate_requires_id() {
        let info = ResourceInfo {
            resource_id: "  ".to_string(),
            resource_type: "network::vpc".to_string(),
            ..Default::default()
        };
        let err = info.validate().unwrap_err();
        assert!(err.to_string().contains("resource_id"));
    }

    #[test]
    fn resource_info_validate_requires_type() {
        let info = ResourceInfo {
            resource_id: "vpc-1".to_string(),
            resource_type: String::new(),
            ..Default::default()
        };
        let err = info.validate().unwrap_err();
        assert!(err.to_string().contains("resource_type"));
    }

    #[test]
    fn into_record_starts_unknown() {
        let info = ResourceInfo {
            resource_id: "vpc-1".to_string(),
            resource_type: "network::vpc".to_string(),
            phase: Some("net".to_string()),
            ..Default::default()
        };
        let record = info.into_record(Utc::now());
        assert_eq!(record.state, ResourceState::Unknown);
        assert_eq!(record.phase.as_deref(), Some("net"));
        assert!(record.expires_at.is_none());
    }

    #[test]
    fn edge_rejects_out_of_range_confidence() {
        let result = Edge::new(
            ResourceId::new("a"),
            ResourceId::new("b"),
            "subnet_vpc",
            1.5,
            provenance(),
        );
        assert!(result.is_err());

        let result = Edge::new(
            ResourceId::new("a"),
            ResourceId::new("b"),
            "subnet_vpc",
            f64::NAN,
            provenance(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn edge_key_ignores_confidence() {
        let a = Edge::new(
            ResourceId::new("a"),
            ResourceId::new("b"),
            "subnet_vpc",
            0.7,
            provenance(),
        )
        .unwrap();
        let b = Edge::new(
            ResourceId::new("a"),
            ResourceId::new("b"),
            "subnet_vpc",
            1.0,
            provenance(),
        )
        .unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn resource_state_serde_snake_case() {
        let json = serde_json::to_string(&ResourceState::Drift).unwrap();
        assert_eq!(json, "\"drift\"");
        let state: ResourceState = serde_json::from_str("\"deleted\"").unwrap();
        assert_eq!(state, ResourceState::Deleted);
    }
}
