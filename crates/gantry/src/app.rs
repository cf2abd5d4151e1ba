//! Application context for command execution.
//!
//! `App` is the dependency-injection root: it owns the catalog and the
//! derived dependency graph and hands references to the components that
//! need them. There are no module-level singletons; the process entry
//! point constructs one `App` and owns its lifecycle.

use crate::catalog::{ResourceCatalog, create_catalog};
use crate::commands::init::{CONFIG_FILE_NAME, GANTRY_DIR_NAME, GantryConfig, find_gantry_root};
use crate::domain::ResourceFilter;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::heal::HealPolicy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application context: catalog, derived graph, and configuration.
///
/// The graph is rebuilt from the catalog on construction: it is a cache
/// of the system of record, never the other way around.
pub struct App {
    /// The durable catalog (trait object for polymorphism).
    catalog: Box<dyn ResourceCatalog>,

    /// The in-memory dependency graph, shared with query facades.
    graph: Arc<RwLock<DependencyGraph>>,

    /// Heal policy from configuration.
    policy: HealPolicy,

    /// Path to the gantry directory (`.gantry`).
    gantry_dir: PathBuf,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("gantry_dir", &self.gantry_dir)
            .field("catalog", &"<dyn ResourceCatalog>")
            .finish()
    }
}

impl App {
    /// Create an `App` from the given working directory.
    ///
    /// Searches up the directory tree for a `.gantry/` directory, loads
    /// configuration, opens the catalog, and rebuilds the graph from it.
    ///
    /// # Errors
    ///
    /// Returns an error if no gantry project is found, the configuration
    /// cannot be loaded, or the catalog cannot be opened.
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_gantry_root(working_dir).ok_or_else(|| {
            Error::Config("Not a gantry project (run 'gantry init' first)".to_string())
        })?;

        let gantry_dir = root_dir.join(GANTRY_DIR_NAME);
        let config_path = gantry_dir.join(CONFIG_FILE_NAME);
        let config = GantryConfig::load(&config_path).await?;

        let backend = config.storage.to_backend(&root_dir)?;
        let catalog = create_catalog(backend).await?;

        let graph = Self::build_graph(catalog.as_ref()).await?;

        Ok(Self {
            catalog,
            graph: Arc::new(RwLock::new(graph)),
            policy: config.heal_policy,
            gantry_dir,
        })
    }

    /// Rebuild a graph from everything the catalog holds.
    async fn build_graph(catalog: &dyn ResourceCatalog) -> Result<DependencyGraph> {
        let records = catalog.list(&ResourceFilter::default()).await?;
        let relationships = catalog.relationships().await?;
        Ok(DependencyGraph::from_catalog_parts(&records, &relationships))
    }

    /// Discard the current graph and rebuild it from the catalog.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be read.
    pub async fn rebuild_graph(&self) -> Result<()> {
        let rebuilt = Self::build_graph(self.catalog.as_ref()).await?;
        let mut graph = self.graph.write().await;
        *graph = rebuilt;
        Ok(())
    }

    /// A handle to the shared dependency graph.
    #[must_use]
    pub fn graph(&self) -> Arc<RwLock<DependencyGraph>> {
        Arc::clone(&self.graph)
    }

    /// A mutable reference to the catalog.
    pub fn catalog_mut(&mut self) -> &mut dyn ResourceCatalog {
        self.catalog.as_mut()
    }

    /// An immutable reference to the catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn ResourceCatalog {
        self.catalog.as_ref()
    }

    /// The configured heal policy.
    #[must_use]
    pub fn policy(&self) -> &HealPolicy {
        &self.policy
    }

    /// Path to the gantry directory.
    #[must_use]
    pub fn gantry_dir(&self) -> &Path {
        &self.gantry_dir
    }

    /// Persist catalog state.
    ///
    /// Called after mutating operations so the system of record catches
    /// up with the in-memory changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the backend write fails.
    pub async fn save(&self) -> Result<()> {
        self.catalog.save().await
    }
}
