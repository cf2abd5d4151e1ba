//! Error types for gantry operations.

use crate::domain::ResourceId;
use std::io;
use thiserror::Error;

/// The error type for gantry operations.
///
/// Non-fatal conditions are deliberately not represented here: cycle breaks
/// and catalog load problems are surfaced as warning values
/// ([`crate::graph::CycleWarning`], [`crate::catalog::LoadWarning`]) and
/// blocked phase deletions are returned as data from the planner, so batch
/// operations can report partial success instead of aborting.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A discovery record is missing mandatory fields or carries values
    /// that fail validation. Recoverable: the caller fixes the record and
    /// retries.
    #[error("Invalid resource record: {0}")]
    InvalidResourceRecord(String),

    /// The durable catalog backend could not complete a read or write.
    /// Transient: retry with backoff at the catalog boundary.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Resource not found in the catalog.
    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceId),
}

/// A specialized Result type for gantry operations.
pub type Result<T> = std::result::Result<T, Error>;
