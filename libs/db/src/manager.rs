//! Config-driven [`SchemaProvider`] keyed by namespace.
//!
//! Namespaces are registered programmatically with
//! [`StorageConfigurationManager::with_namespace`] or loaded from a JSON
//! manifest:
//!
//! ```json
//! {
//!   "base_dir": "/var/lib/cellar",
//!   "namespaces": {
//!     "accounts": {
//!       "column_families": [{ "name": "accounts/by_id" }],
//!       "version": { "accounts/version": 1 },
//!       "sequences": { "accounts/next_id": 0 }
//!     }
//!   }
//! }
//! ```
//!
//! Unless overridden per namespace, a store lives at `<base_dir>/<namespace>`
//! and its engine options file at `<base_dir>/<namespace>.json`. All column
//! families handed out by one manager share a single block cache sized by the
//! optional `block_cache_bytes` manifest field.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rocksdb::{Cache, DEFAULT_COLUMN_FAMILY_NAME};
use serde::{Deserialize, Serialize};

use crate::config::{BlockCacheConfig, DEFAULT_BLOCK_CACHE_BYTES};
use crate::error::StorageError;
use crate::provider::{
    ColumnDefinition, ColumnDefinitionsPreparer, DefinitionMode, SchemaProvider, SequenceMap,
    VersionMap,
};

// ============================================================================
// Schema description
// ============================================================================

/// A column family and its table tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamilySpec {
    pub name: String,
    #[serde(default)]
    pub block_cache: BlockCacheConfig,
}

impl ColumnFamilySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block_cache: BlockCacheConfig::default(),
        }
    }

    pub fn with_block_cache(mut self, config: BlockCacheConfig) -> Self {
        self.block_cache = config;
        self
    }

    fn definition(&self, cache: &Cache) -> ColumnDefinition {
        ColumnDefinition::new(&self.name, self.block_cache.cf_options(cache))
    }
}

/// Everything the lifecycle layer needs to know about one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSchema {
    /// Non-default column families.
    pub column_families: Vec<ColumnFamilySpec>,
    pub version: VersionMap,
    pub sequences: SequenceMap,
    /// Store directory. Relative paths resolve against the manager's base dir.
    pub path: Option<PathBuf>,
    /// Engine options file. Relative paths resolve against the manager's base dir.
    pub config_file: Option<PathBuf>,
}

impl NamespaceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column_family(mut self, spec: ColumnFamilySpec) -> Self {
        self.column_families.push(spec);
        self
    }

    pub fn with_version(mut self, key: impl Into<String>, version: u32) -> Self {
        self.version.insert(key.into(), version);
        self
    }

    pub fn with_sequence(mut self, key: impl Into<String>, start: u64) -> Self {
        self.sequences.insert(key.into(), start);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }
}

// ============================================================================
// StorageConfigurationManager
// ============================================================================

#[derive(Debug, Deserialize)]
struct Manifest {
    base_dir: PathBuf,
    #[serde(default = "default_block_cache_bytes")]
    block_cache_bytes: usize,
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSchema>,
}

fn default_block_cache_bytes() -> usize {
    DEFAULT_BLOCK_CACHE_BYTES
}

/// Why a namespace's column family list cannot be created as given.
fn invalid_column_families(name: &str, schema: &NamespaceSchema) -> Option<String> {
    let mut seen = BTreeSet::new();
    for cf in &schema.column_families {
        if cf.name == DEFAULT_COLUMN_FAMILY_NAME {
            return Some(format!(
                "namespace `{name}` must not list the `{DEFAULT_COLUMN_FAMILY_NAME}` column family"
            ));
        }
        if !seen.insert(cf.name.as_str()) {
            return Some(format!(
                "namespace `{name}` lists column family `{}` more than once",
                cf.name
            ));
        }
    }
    None
}

/// Namespace registry implementing [`SchemaProvider`].
///
/// Unknown namespaces resolve to an empty schema: no extra column families,
/// no version stamps and no sequences.
///
/// Clones share the block cache.
#[derive(Clone)]
pub struct StorageConfigurationManager {
    base_dir: PathBuf,
    namespaces: BTreeMap<String, NamespaceSchema>,
    block_cache_bytes: usize,
    block_cache: Cache,
}

impl StorageConfigurationManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            namespaces: BTreeMap::new(),
            block_cache_bytes: DEFAULT_BLOCK_CACHE_BYTES,
            block_cache: Cache::new_lru_cache(DEFAULT_BLOCK_CACHE_BYTES),
        }
    }

    /// Replace the shared block cache with one of `bytes` capacity.
    pub fn with_block_cache_bytes(mut self, bytes: usize) -> Self {
        self.block_cache_bytes = bytes;
        self.block_cache = Cache::new_lru_cache(bytes);
        self
    }

    pub fn with_namespace(mut self, name: impl Into<String>, schema: NamespaceSchema) -> Self {
        self.namespaces.insert(name.into(), schema);
        self
    }

    /// Load a JSON manifest. A relative `base_dir` resolves against the
    /// manifest's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_err = |reason: String| StorageError::Config {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| config_err(e.to_string()))?;

        for (name, schema) in &manifest.namespaces {
            if let Some(reason) = invalid_column_families(name, schema) {
                return Err(config_err(reason).into());
            }
        }

        let base_dir = if manifest.base_dir.is_relative() {
            path.parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&manifest.base_dir)
        } else {
            manifest.base_dir
        };

        tracing::debug!(
            manifest = ?path,
            base_dir = ?base_dir,
            namespaces = manifest.namespaces.len(),
            block_cache_mb = manifest.block_cache_bytes / (1024 * 1024),
            "[StorageConfigurationManager] Loaded manifest"
        );

        Ok(Self {
            base_dir,
            namespaces: manifest.namespaces,
            block_cache_bytes: manifest.block_cache_bytes,
            block_cache: Cache::new_lru_cache(manifest.block_cache_bytes),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceSchema> {
        self.namespaces.get(name)
    }

    pub fn namespace_names(&self) -> Vec<&str> {
        self.namespaces.keys().map(String::as_str).collect()
    }

    /// The block cache shared by every column family this manager defines.
    pub fn block_cache(&self) -> &Cache {
        &self.block_cache
    }

    pub fn block_cache_bytes(&self) -> usize {
        self.block_cache_bytes
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

impl std::fmt::Debug for StorageConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfigurationManager")
            .field("base_dir", &self.base_dir)
            .field("namespaces", &self.namespaces)
            .field("block_cache_bytes", &self.block_cache_bytes)
            .finish_non_exhaustive()
    }
}

impl SchemaProvider for StorageConfigurationManager {
    fn column_definitions(&self, namespace: &str) -> ColumnDefinitionsPreparer {
        let specs = self
            .namespaces
            .get(namespace)
            .map(|schema| schema.column_families.clone())
            .unwrap_or_default();
        let cache = self.block_cache.clone();

        Arc::new(move |mode| {
            let mut definitions: Vec<ColumnDefinition> =
                specs.iter().map(|spec| spec.definition(&cache)).collect();
            if mode == DefinitionMode::Preview {
                definitions.insert(
                    0,
                    ColumnDefinition::new(DEFAULT_COLUMN_FAMILY_NAME, rocksdb::Options::default()),
                );
            }
            definitions
        })
    }

    fn storage_path(&self, namespace: &str) -> PathBuf {
        match self.namespaces.get(namespace).and_then(|s| s.path.as_ref()) {
            Some(path) => self.resolve(path),
            None => self.base_dir.join(namespace),
        }
    }

    fn version(&self, namespace: &str) -> VersionMap {
        self.namespaces
            .get(namespace)
            .map(|s| s.version.clone())
            .unwrap_or_default()
    }

    fn sequences(&self, namespace: &str) -> SequenceMap {
        self.namespaces
            .get(namespace)
            .map(|s| s.sequences.clone())
            .unwrap_or_default()
    }

    fn config_file(&self, namespace: &str) -> PathBuf {
        match self
            .namespaces
            .get(namespace)
            .and_then(|s| s.config_file.as_ref())
        {
            Some(path) => self.resolve(path),
            None => self.base_dir.join(format!("{namespace}.json")),
        }
    }
}
