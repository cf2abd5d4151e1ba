//! Catalog abstraction layer for gantry.
//!
//! The catalog is the durable system of record for resource records and
//! pairwise relationships. The in-memory dependency graph is derived from
//! it and can always be rebuilt; components therefore persist through this
//! trait and treat the graph as a query accelerator only.
//!
//! # Architecture
//!
//! The catalog uses an async trait to enable both blocking (in-memory) and
//! truly async (remote record store) implementations. The trait is
//! object-safe, allowing dynamic dispatch via `Box<dyn ResourceCatalog>`.
//!
//! # Test Utilities
//!
//! A stateless [`MockCatalog`] is available to downstream crates behind the
//! `test-util` feature for testing code that takes a `Box<dyn
//! ResourceCatalog>` without wiring up a real backend.

use crate::domain::{Edge, ResourceFilter, ResourceId, ResourceRecord, ResourceState};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub mod in_memory;

pub use in_memory::{LoadWarning, load_from_jsonl, new_in_memory_catalog, save_to_jsonl};

/// Core catalog trait for resource and relationship records.
///
/// All writes are **idempotent**: re-putting an identical record or
/// re-adding an identical relationship is a no-op, not a duplicate. This is
/// what makes the catalog safe for concurrent independent writers at the
/// backend level; nothing in this core re-implements distributed locking.
///
/// # Error Handling
///
/// Backend failures surface as [`crate::error::Error::StorageUnavailable`]
/// and must not corrupt graph state already built from prior successful
/// reads.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    // ========== Resource Records ==========

    /// Insert or replace a resource record.
    async fn put(&mut self, record: ResourceRecord) -> Result<()>;

    /// Get a resource record by ID.
    ///
    /// Returns `None` if the record doesn't exist.
    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>>;

    /// List records matching the given filter.
    ///
    /// Results are ordered by ascending ID for determinism.
    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<ResourceRecord>>;

    /// Update a record's lifecycle state, optionally stamping an expiry.
    ///
    /// This is the record store's update-attribute operation; it returns
    /// the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ResourceNotFound`] if the record
    /// doesn't exist.
    async fn update_state(
        &mut self,
        id: &ResourceId,
        state: ResourceState,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourceRecord>;

    // ========== Relationships ==========

    /// Store a relationship edge.
    ///
    /// Idempotent: returns `true` when a new edge was stored and `false`
    /// when an identical (source, target, type) triple already existed.
    async fn add_relationship(&mut self, edge: Edge) -> Result<bool>;

    /// All relationships where `id` is the dependent (edges out of `id`).
    async fn dependencies(&self, id: &ResourceId) -> Result<Vec<Edge>>;

    /// All relationships where `id` is depended upon (edges into `id`).
    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Edge>>;

    /// All stored relationships, ordered by (source, target, type).
    ///
    /// Used to rebuild the in-memory graph at startup.
    async fn relationships(&self) -> Result<Vec<Edge>>;

    /// Remove every relationship incident to `id`.
    ///
    /// Used after a confirmed deletion. Returns the number of edges
    /// removed.
    async fn remove_relationships(&mut self, id: &ResourceId) -> Result<usize>;

    // ========== Persistence ==========

    /// Save changes to durable storage.
    ///
    /// Takes `&self` so saves can happen from shared references;
    /// implementations use interior mutability. A no-op for purely
    /// in-memory backends.
    async fn save(&self) -> Result<()>;

    /// Reload state from durable storage, discarding unsaved in-memory
    /// changes. Restores consistency after a failed `save()`.
    async fn reload(&mut self) -> Result<()>;
}

/// Catalog backend configuration.
#[derive(Debug, Clone)]
pub enum CatalogBackend {
    /// In-memory records (ephemeral).
    InMemory,

    /// JSONL file storage (persistent).
    Jsonl(PathBuf),
}

impl CatalogBackend {
    /// Returns the data file path for file-based backends.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        match self {
            CatalogBackend::Jsonl(path) => Some(path),
            CatalogBackend::InMemory => None,
        }
    }
}

/// Wrapper that adds JSONL file persistence to the in-memory backend.
///
/// `save()` writes every record and relationship to the JSONL file
/// atomically; `reload()` rebuilds the inner catalog from disk.
struct JsonlBackedCatalog {
    inner: Box<dyn ResourceCatalog>,
    path: PathBuf,
}

#[async_trait]
impl ResourceCatalog for JsonlBackedCatalog {
    async fn put(&mut self, record: ResourceRecord) -> Result<()> {
        self.inner.put(record).await
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<ResourceRecord>> {
        self.inner.list(filter).await
    }

    async fn update_state(
        &mut self,
        id: &ResourceId,
        state: ResourceState,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourceRecord> {
        self.inner.update_state(id, state, expires_at).await
    }

    async fn add_relationship(&mut self, edge: Edge) -> Result<bool> {
        self.inner.add_relationship(edge).await
    }

    async fn dependencies(&self, id: &ResourceId) -> Result<Vec<Edge>> {
        self.inner.dependencies(id).await
    }

    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Edge>> {
        self.inner.dependents(id).await
    }

    async fn relationships(&self) -> Result<Vec<Edge>> {
        self.inner.relationships().await
    }

    async fn remove_relationships(&mut self, id: &ResourceId) -> Result<usize> {
        self.inner.remove_relationships(id).await
    }

    async fn save(&self) -> Result<()> {
        save_to_jsonl(self.inner.as_ref(), &self.path).await
    }

    async fn reload(&mut self) -> Result<()> {
        if self.path.exists() {
            let (catalog, warnings) = load_from_jsonl(&self.path).await?;
            for warning in &warnings {
                tracing::warn!(warning = ?warning, "catalog reload warning");
            }
            self.inner = catalog;
        } else {
            self.inner = new_in_memory_catalog();
        }
        Ok(())
    }
}

/// Create a catalog instance for the given backend.
///
/// # Errors
///
/// Returns [`crate::error::Error::StorageUnavailable`] if a file-based
/// backend cannot be read.
pub async fn create_catalog(backend: CatalogBackend) -> Result<Box<dyn ResourceCatalog>> {
    match backend {
        CatalogBackend::InMemory => Ok(new_in_memory_catalog()),
        CatalogBackend::Jsonl(path) => {
            let inner = if path.exists() {
                let (catalog, warnings) = load_from_jsonl(&path).await?;
                for warning in &warnings {
                    // Non-fatal: the catalog is still usable.
                    tracing::warn!(warning = ?warning, "catalog load warning");
                }
                catalog
            } else {
                // First run: the file is created on the first save.
                new_in_memory_catalog()
            };
            Ok(Box::new(JsonlBackedCatalog { inner, path }))
        }
    }
}

// ========== Test Utilities ==========

/// The hardcoded resource ID recognized by [`MockCatalog`].
#[cfg(any(test, feature = "test-util"))]
pub const MOCK_RESOURCE_ID: &str = "mock-1";

/// Stateless mock implementation of [`ResourceCatalog`] for testing.
///
/// Always answers for resource "mock-1" and persists nothing between
/// calls. Use [`in_memory::new_in_memory_catalog`] when a test needs real
/// CRUD behavior; use `MockCatalog` to verify trait-object plumbing.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Copy, Default)]
#[non_exhaustive]
pub struct MockCatalog;

#[cfg(any(test, feature = "test-util"))]
impl MockCatalog {
    /// Create a new `MockCatalog` instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the canonical record returned by this mock for `id`.
    #[must_use]
    pub fn mock_record(id: ResourceId) -> ResourceRecord {
        let now = Utc::now();
        ResourceRecord {
            id,
            resource_type: "compute::service".to_string(),
            state: ResourceState::Healthy,
            phase: None,
            metadata: std::collections::BTreeMap::new(),
            first_seen: now,
            last_seen: now,
            expires_at: None,
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl ResourceCatalog for MockCatalog {
    async fn put(&mut self, _record: ResourceRecord) -> Result<()> {
        Ok(())
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        if id.as_str() == MOCK_RESOURCE_ID {
            Ok(Some(Self::mock_record(id.clone())))
        } else {
            Ok(None)
        }
    }

    async fn list(&self, _filter: &ResourceFilter) -> Result<Vec<ResourceRecord>> {
        Ok(vec![])
    }

    async fn update_state(
        &mut self,
        id: &ResourceId,
        state: ResourceState,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourceRecord> {
        let mut record = Self::mock_record(id.clone());
        record.state = state;
        record.expires_at = expires_at;
        Ok(record)
    }

    async fn add_relationship(&mut self, _edge: Edge) -> Result<bool> {
        Ok(true)
    }

    async fn dependencies(&self, _id: &ResourceId) -> Result<Vec<Edge>> {
        Ok(vec![])
    }

    async fn dependents(&self, _id: &ResourceId) -> Result<Vec<Edge>> {
        Ok(vec![])
    }

    async fn relationships(&self) -> Result<Vec<Edge>> {
        Ok(vec![])
    }

    async fn remove_relationships(&mut self, _id: &ResourceId) -> Result<usize> {
        Ok(0)
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}
