//! In-memory catalog backend with optional JSONL persistence.
//!
//! Records live in a `HashMap` keyed by resource ID; relationships live in
//! a `BTreeMap` keyed by the (source, target, type) triple, which gives
//! idempotent upserts and deterministic iteration order for free.
//!
//! # Persistence
//!
//! The backend itself is ephemeral. `load_from_jsonl()` and
//! `save_to_jsonl()` add durable storage on top: one JSONL file holds both
//! record kinds as tagged lines, written atomically (write-then-rename).
//! Loading is resilient: malformed lines, orphaned relationships, and
//! invalid records are skipped with warnings, never hard failures, because
//! the catalog must stay usable in the face of partial corruption.
//!
//! # Thread Safety
//!
//! The inner structure is wrapped in `Arc<tokio::sync::Mutex<_>>`; every
//! trait method takes the lock, so concurrent tasks never observe a
//! half-applied write.

mod inner;
mod jsonl;
mod trait_impl;

use crate::catalog::ResourceCatalog;
use inner::CatalogInner;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use jsonl::{LoadWarning, load_from_jsonl, save_to_jsonl};

/// Thread-safe in-memory catalog.
pub(crate) type InMemoryCatalog = Arc<Mutex<CatalogInner>>;

/// Create a new, empty in-memory catalog.
#[must_use]
pub fn new_in_memory_catalog() -> Box<dyn ResourceCatalog> {
    Box::new(Arc::new(Mutex::new(CatalogInner::new())))
}
