//! Shared fixtures for lifecycle integration tests.
//!
//! Every test gets its own `TempDir`; the namespace `ledger` is registered
//! with one extra column family, one version stamp and one sequence.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use cellar_db::{
    ColumnFamilySpec, NamespaceSchema, PersistentStorage, PrimitiveCodec,
    StorageConfigurationManager,
};
use tempfile::TempDir;

pub const NAMESPACE: &str = "ledger";
pub const OBJECTS_CF: &str = "ledger/objects";
pub const VERSION_KEY: &str = "v";
pub const SEQUENCE_KEY: &str = "objects";

pub fn ledger_schema() -> NamespaceSchema {
    NamespaceSchema::new()
        .with_column_family(ColumnFamilySpec::new(OBJECTS_CF))
        .with_version(VERSION_KEY, 1)
        .with_sequence(SEQUENCE_KEY, 0)
}

pub fn manager(temp_dir: &TempDir, schema: NamespaceSchema) -> StorageConfigurationManager {
    StorageConfigurationManager::new(temp_dir.path()).with_namespace(NAMESPACE, schema)
}

pub fn ledger_storage(temp_dir: &TempDir) -> PersistentStorage {
    PersistentStorage::new(NAMESPACE, Arc::new(manager(temp_dir, ledger_schema())))
}

pub fn created_storage(temp_dir: &TempDir) -> PersistentStorage {
    let mut storage = ledger_storage(temp_dir);
    assert!(storage.create(), "create failed: {:?}", storage.last_error());
    storage
}

pub fn opened_storage(temp_dir: &TempDir) -> PersistentStorage {
    let mut storage = created_storage(temp_dir);
    assert!(storage.open(), "open failed: {:?}", storage.last_error());
    storage
}

/// Open a closed store directly with RocksDB, bypassing the lifecycle layer.
pub fn raw_db(path: &Path) -> rocksdb::DB {
    let opts = rocksdb::Options::default();
    let cfs = rocksdb::DB::list_cf(&opts, path).expect("list column families");
    rocksdb::DB::open_cf(&opts, path, cfs).expect("open raw db")
}

pub fn raw_version(path: &Path, key: &str) -> Option<u32> {
    raw_db(path)
        .get(key)
        .unwrap()
        .map(|raw| u32::decode(&raw).unwrap())
}

pub fn raw_sequence(path: &Path, key: &str) -> Option<u64> {
    raw_db(path)
        .get(key)
        .unwrap()
        .map(|raw| u64::decode(&raw).unwrap())
}
