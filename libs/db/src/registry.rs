//! Ownership container for the column families open on a store handle.

/// Ordered set of column families held open by [`PersistentStorage`].
///
/// RocksDB keeps the actual handle objects inside the `DB`; the registry
/// records which of them this layer acquired so they can be flushed in order
/// and released exactly once. Other components only ever borrow from it.
///
/// [`PersistentStorage`]: crate::PersistentStorage
#[derive(Debug, Default)]
pub struct ColumnFamilyRegistry {
    names: Vec<String>,
}

impl ColumnFamilyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a column family acquired from the engine. Duplicates are ignored.
    pub fn register(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Registered names in acquisition order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Release every registered family and empty the registry.
    ///
    /// Returns how many were released; calling it again returns 0.
    pub fn cleanup(&mut self) -> usize {
        let released = self.names.len();
        self.names.clear();
        if released > 0 {
            tracing::trace!(released, "[ColumnFamilyRegistry] Released column families");
        }
        released
    }
}
