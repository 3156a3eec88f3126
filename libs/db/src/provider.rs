//! Schema provider seam between the lifecycle layer and its owners.
//!
//! Each logical owner ("namespace") of a store supplies its column family
//! definitions, storage path, expected version stamps and initial sequence
//! counters through [`SchemaProvider`]. The lifecycle layer never learns
//! what the families hold; it only asks for them in one of two modes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Expected on-disk version stamp per key.
pub type VersionMap = BTreeMap<String, u32>;

/// Next unused identifier per object kind.
pub type SequenceMap = BTreeMap<String, u64>;

/// Which set of column family definitions a preparer should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionMode {
    /// Every family an existing store must contain, including `default`,
    /// with the options needed to open it.
    Preview,
    /// The families to create on a freshly created store (`default`
    /// already exists and is omitted).
    Full,
}

/// A named column family and the options it is opened or created with.
#[derive(Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub options: Options,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, options: Options) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    pub fn descriptor(&self) -> ColumnFamilyDescriptor {
        ColumnFamilyDescriptor::new(&self.name, self.options.clone())
    }
}

impl std::fmt::Debug for ColumnDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Strategy producing column family definitions for a namespace.
pub type ColumnDefinitionsPreparer = Arc<dyn Fn(DefinitionMode) -> Vec<ColumnDefinition> + Send + Sync>;

/// Read-only source of per-namespace schema and placement.
///
/// # Example
///
/// ```ignore
/// struct Fixed(PathBuf);
///
/// impl SchemaProvider for Fixed {
///     fn column_definitions(&self, _ns: &str) -> ColumnDefinitionsPreparer {
///         Arc::new(|mode| match mode {
///             DefinitionMode::Preview => vec![default_cf(), objects_cf()],
///             DefinitionMode::Full => vec![objects_cf()],
///         })
///     }
///     // ...
/// }
/// ```
pub trait SchemaProvider: Send + Sync {
    fn column_definitions(&self, namespace: &str) -> ColumnDefinitionsPreparer;

    fn storage_path(&self, namespace: &str) -> PathBuf;

    fn version(&self, namespace: &str) -> VersionMap;

    fn sequences(&self, namespace: &str) -> SequenceMap;

    /// Path of the engine options file for `namespace`.
    fn config_file(&self, namespace: &str) -> PathBuf;

    /// Whether the engine options file is present.
    fn exist_config_file(&self, namespace: &str) -> bool {
        self.config_file(namespace).is_file()
    }
}
