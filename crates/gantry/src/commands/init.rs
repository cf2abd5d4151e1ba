//! Implementation of the `init` command.
//!
//! Initialization creates the `.gantry/` directory with a YAML
//! configuration file and an empty catalog data file.

use crate::catalog::CatalogBackend;
use crate::error::{Error, Result};
use crate::heal::HealPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the gantry directory.
pub const GANTRY_DIR_NAME: &str = ".gantry";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the catalog data file.
pub const CATALOG_FILE_NAME: &str = "catalog.jsonl";

/// Maximum directory depth to traverse when searching for the gantry root.
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Configuration file structure for gantry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GantryConfig {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Heal-policy overrides; defaults to the shipped constants.
    #[serde(default)]
    pub heal_policy: HealPolicy,
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend type: "memory" (in-memory with JSONL persistence) or
    /// "ephemeral" (no persistence).
    pub backend: String,

    /// Path to the data file, relative to the project root.
    pub data_file: String,
}

impl GantryConfig {
    /// The default configuration written by `init`.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            storage: StorageConfig {
                backend: "memory".to_string(),
                data_file: format!("{GANTRY_DIR_NAME}/{CATALOG_FILE_NAME}"),
            },
            heal_policy: HealPolicy::default(),
        }
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing or malformed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails, [`Error::Io`] on
    /// write failure.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

impl StorageConfig {
    /// Resolve the configured backend against the project root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown backend names.
    pub fn to_backend(&self, root_dir: &Path) -> Result<CatalogBackend> {
        match self.backend.as_str() {
            "memory" | "jsonl" => Ok(CatalogBackend::Jsonl(root_dir.join(&self.data_file))),
            "ephemeral" => Ok(CatalogBackend::InMemory),
            other => Err(Error::Config(format!("unknown storage backend '{other}'"))),
        }
    }
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Result of the init command.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created gantry directory.
    pub gantry_dir: PathBuf,
    /// Path to the created config file.
    pub config_file: PathBuf,
    /// Path to the created catalog file.
    pub catalog_file: PathBuf,
}

/// Initialize a new gantry project in the given directory.
///
/// # Errors
///
/// Returns [`Error::Config`] if the directory is already initialized, or
/// [`Error::Io`] if file system operations fail.
pub async fn init(base_dir: &Path) -> Result<InitResult> {
    let gantry_dir = base_dir.join(GANTRY_DIR_NAME);

    if gantry_dir.exists() {
        return Err(Error::Config(format!(
            "Gantry is already initialized in this directory. Found existing '{GANTRY_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&gantry_dir).await?;

    let config_file = gantry_dir.join(CONFIG_FILE_NAME);
    let config = GantryConfig::standard();
    config.save(&config_file).await?;

    let catalog_file = gantry_dir.join(CATALOG_FILE_NAME);
    fs::write(&catalog_file, "").await?;

    Ok(InitResult {
        gantry_dir,
        config_file,
        catalog_file,
    })
}

/// Check whether a directory has been initialized with gantry.
#[must_use]
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(GANTRY_DIR_NAME).exists()
}

/// Find the gantry root directory by searching up the directory tree.
///
/// Returns `Some(path)` with the directory containing `.gantry/`, or
/// `None` if no project is found within the depth limit.
#[must_use]
pub fn find_gantry_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(GANTRY_DIR_NAME).exists() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ========== GantryConfig Tests ==========

    #[test]
    fn config_standard_uses_memory_backend() {
        let config = GantryConfig::standard();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.data_file, ".gantry/catalog.jsonl");
    }

    #[tokio::test]
    async fn config_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let original = GantryConfig::standard();
        original.save(&config_path).await.unwrap();

        let loaded = GantryConfig::load(&config_path).await.unwrap();
        assert_eq!(original, loaded);
    }

    #[tokio::test]
    async fn config_defaults_heal_policy_when_absent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(
            &config_path,
            "storage:\n  backend: memory\n  data_file: .gantry/catalog.jsonl\n",
        )
        .await
        .unwrap();

        let loaded = GantryConfig::load(&config_path).await.unwrap();
        assert_eq!(loaded.heal_policy, HealPolicy::default());
    }

    #[test]
    fn to_backend_rejects_unknown_names() {
        let config = StorageConfig {
            backend: "postgres".to_string(),
            data_file: String::new(),
        };
        assert!(config.to_backend(Path::new(".")).is_err());
    }

    // ========== Init Command Tests ==========

    #[tokio::test]
    async fn init_creates_directory_structure() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path()).await.unwrap();

        assert!(result.gantry_dir.exists());
        assert!(result.config_file.exists());
        assert!(result.catalog_file.exists());

        let content = tokio::fs::read_to_string(&result.catalog_file).await.unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();

        init(temp_dir.path()).await.unwrap();
        let result = init(temp_dir.path()).await;

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string().to_lowercase();
        assert!(err_msg.contains("already initialized"));
    }

    // ========== Utility Function Tests ==========

    #[test]
    fn is_initialized_reflects_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_initialized(temp_dir.path()));

        std::fs::create_dir(temp_dir.path().join(GANTRY_DIR_NAME)).unwrap();
        assert!(is_initialized(temp_dir.path()));
    }

    #[test]
    fn find_gantry_root_in_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(GANTRY_DIR_NAME)).unwrap();

        let sub_dir = temp_dir.path().join("infra").join("nested");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let found = find_gantry_root(&sub_dir);
        assert_eq!(found, Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn find_gantry_root_not_found() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_gantry_root(temp_dir.path()).is_none());
    }
}
