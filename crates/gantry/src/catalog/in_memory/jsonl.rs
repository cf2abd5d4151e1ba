//! JSONL persistence for the in-memory catalog.
//!
//! One file holds both record kinds as tagged lines:
//!
//! ```text
//! {"kind":"resource","id":"vpc-1","resource_type":"network::vpc",...}
//! {"kind":"relationship","source_id":"subnet-1","target_id":"vpc-1",...}
//! ```
//!
//! Loading is resilient: bad lines are skipped with a [`LoadWarning`]
//! rather than failing the whole load, because a partially corrupt catalog
//! file must not take the engine down.

use super::inner::CatalogInner;
use crate::catalog::ResourceCatalog;
use crate::domain::{Edge, ResourceFilter, ResourceId, ResourceRecord};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// A single line of the catalog file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CatalogLine {
    /// A resource record.
    Resource(ResourceRecord),
    /// A relationship edge.
    Relationship(Edge),
}

/// Warnings that can occur while loading a catalog file.
///
/// Non-fatal: the load continues and problem data is skipped. Callers
/// should log these, as they indicate corruption or integrity issues that
/// may need manual attention.
#[derive(Debug, Clone)]
pub enum LoadWarning {
    /// A line that couldn't be parsed as JSON or as a known record kind.
    ///
    /// **Effect**: the line is skipped entirely.
    MalformedLine {
        /// 1-based line number in the file.
        line_number: usize,
        /// Parser error text.
        error: String,
    },

    /// A relationship referencing a resource that isn't in the file.
    ///
    /// **Effect**: the edge is skipped; both endpoints that do exist are
    /// still loaded.
    OrphanedRelationship {
        /// The dependent resource.
        source: ResourceId,
        /// The missing (or present-but-unmatched) dependency.
        target: ResourceId,
    },

    /// A record or edge that parsed but failed validation, e.g. an edge
    /// confidence outside [0, 1] or a self-loop.
    ///
    /// **Effect**: the entry is skipped.
    InvalidEntry {
        /// 1-based line number in the file.
        line_number: usize,
        /// Validation error text.
        error: String,
    },
}

/// Load a catalog from a JSONL file.
///
/// Returns the catalog plus all non-fatal warnings gathered during the
/// load.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] only when the file itself cannot
/// be read; content problems become warnings instead.
pub async fn load_from_jsonl(
    path: &Path,
) -> Result<(Box<dyn ResourceCatalog>, Vec<LoadWarning>)> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("reading {}: {e}", path.display())))?;

    let mut warnings = Vec::new();
    let mut records: Vec<ResourceRecord> = Vec::new();
    let mut edges: Vec<(usize, Edge)> = Vec::new();

    // First pass: parse every line, splitting by kind.
    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CatalogLine>(line) {
            Ok(CatalogLine::Resource(record)) => records.push(record),
            Ok(CatalogLine::Relationship(edge)) => edges.push((line_number, edge)),
            Err(error) => warnings.push(LoadWarning::MalformedLine {
                line_number,
                error: error.to_string(),
            }),
        }
    }

    let mut inner = CatalogInner::new();
    for record in records {
        inner.records.insert(record.id.clone(), record);
    }

    // Second pass: attach relationships, dropping anything that doesn't
    // validate against the loaded record set. The catalog is the source of
    // truth, so bad edges are repaired out here rather than propagated.
    for (line_number, edge) in edges {
        if !edge.confidence.is_finite() || !(0.0..=1.0).contains(&edge.confidence) {
            warnings.push(LoadWarning::InvalidEntry {
                line_number,
                error: format!("edge confidence {} out of range", edge.confidence),
            });
            continue;
        }

        if edge.source_id == edge.target_id {
            warnings.push(LoadWarning::InvalidEntry {
                line_number,
                error: format!("self-loop on {}", edge.source_id),
            });
            continue;
        }

        if !inner.records.contains_key(&edge.source_id)
            || !inner.records.contains_key(&edge.target_id)
        {
            warnings.push(LoadWarning::OrphanedRelationship {
                source: edge.source_id.clone(),
                target: edge.target_id.clone(),
            });
            continue;
        }

        inner.insert_relationship(edge);
    }

    Ok((Box::new(Arc::new(Mutex::new(inner))), warnings))
}

/// Save a catalog to a JSONL file with atomic writes.
///
/// Writes to a temporary file first, then renames over the target, so an
/// interrupted save leaves the original file intact.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the file cannot be written.
pub async fn save_to_jsonl(catalog: &dyn ResourceCatalog, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let file = File::create(&temp_path)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("creating {}: {e}", temp_path.display())))?;
    let mut writer = BufWriter::new(file);

    // Records first (sorted by ID via list), then relationships (already
    // key-ordered). Deterministic output keeps file diffs reviewable.
    let records = catalog.list(&ResourceFilter::default()).await?;
    for record in records {
        write_line(&mut writer, &CatalogLine::Resource(record)).await?;
    }

    let relationships = catalog.relationships().await?;
    for edge in relationships {
        write_line(&mut writer, &CatalogLine::Relationship(edge)).await?;
    }

    writer
        .flush()
        .await
        .map_err(|e| Error::StorageUnavailable(format!("flushing {}: {e}", temp_path.display())))?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("renaming {}: {e}", path.display())))?;

    Ok(())
}

async fn write_line(writer: &mut BufWriter<File>, line: &CatalogLine) -> Result<()> {
    let json = serde_json::to_string(line)?;
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| Error::StorageUnavailable(format!("writing catalog line: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| Error::StorageUnavailable(format!("writing catalog line: {e}")))?;
    Ok(())
}
