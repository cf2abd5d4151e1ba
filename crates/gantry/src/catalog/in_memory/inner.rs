//! Core in-memory catalog data structures.

use crate::domain::{Edge, ResourceId, ResourceRecord};
use std::collections::{BTreeMap, HashMap};

/// Key identifying a relationship: (source, target, relationship type).
pub(super) type EdgeKey = (ResourceId, ResourceId, String);

/// Inner catalog structure (not thread-safe on its own).
///
/// Wrapped in `Arc<Mutex<_>>` by the public constructor.
pub(crate) struct CatalogInner {
    /// Resource records indexed by ID for O(1) lookups.
    pub(super) records: HashMap<ResourceId, ResourceRecord>,

    /// Relationships keyed by (source, target, type).
    ///
    /// The key doubles as the idempotence check: inserting an existing
    /// triple is a no-op. `BTreeMap` keeps iteration deterministic.
    pub(super) relationships: BTreeMap<EdgeKey, Edge>,
}

impl CatalogInner {
    /// Create a new empty catalog.
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Insert a relationship if its key is not already present.
    ///
    /// Returns `true` when the edge was stored, `false` on the no-op path.
    pub(super) fn insert_relationship(&mut self, edge: Edge) -> bool {
        let key = edge.key();
        if self.relationships.contains_key(&key) {
            return false;
        }
        self.relationships.insert(key, edge);
        true
    }
}
