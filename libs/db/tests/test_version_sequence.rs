//! Integration tests for version stamp verification and sequence persistence.

mod common;

use std::sync::Arc;

use cellar_db::{PersistentStorage, PrimitiveCodec, StorageError};
use common::*;
use tempfile::TempDir;

fn last_storage_error(storage: &PersistentStorage) -> Option<&StorageError> {
    storage.last_error().and_then(|e| e.downcast_ref::<StorageError>())
}

#[test]
fn test_reopen_reports_created_version() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);
    assert_eq!(storage.versions()[VERSION_KEY], 1);
    assert!(storage.close());

    assert!(storage.open());
    assert_eq!(storage.versions()[VERSION_KEY], 1);
    assert!(storage.close());
}

#[test]
fn test_externally_mutated_version_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let storage = created_storage(&temp_dir);
    let path = storage.path();
    drop(storage);

    raw_db(&path).put(VERSION_KEY, 2u32.encode()).unwrap();

    let mut storage = ledger_storage(&temp_dir);
    assert!(!storage.open());
    assert!(storage.is_closed());
    assert!(storage.column_families().is_empty());
    assert!(matches!(
        last_storage_error(&storage),
        Some(StorageError::VersionMismatch { key, expected: 1, found: 2 }) if key == VERSION_KEY
    ));
}

#[test]
fn test_schema_version_bump_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    drop(created_storage(&temp_dir));

    let schema = ledger_schema().with_version(VERSION_KEY, 2);
    let mut storage = PersistentStorage::new(NAMESPACE, Arc::new(manager(&temp_dir, schema)));

    assert!(!storage.open());
    assert!(matches!(
        last_storage_error(&storage),
        Some(StorageError::VersionMismatch { expected: 2, found: 1, .. })
    ));
}

#[test]
fn test_missing_version_stamp_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    drop(created_storage(&temp_dir));

    let schema = ledger_schema().with_version("added_later", 1);
    let mut storage = PersistentStorage::new(NAMESPACE, Arc::new(manager(&temp_dir, schema)));

    assert!(!storage.open());
    assert!(matches!(
        last_storage_error(&storage),
        Some(StorageError::MissingKey { key }) if key == "added_later"
    ));
}

#[test]
fn test_wrong_width_version_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let storage = created_storage(&temp_dir);
    let path = storage.path();
    drop(storage);

    raw_db(&path).put(VERSION_KEY, 1u64.encode()).unwrap();

    let mut storage = ledger_storage(&temp_dir);
    assert!(!storage.open());
    assert!(matches!(
        last_storage_error(&storage),
        Some(StorageError::Codec { expected: 4, actual: 8 })
    ));
}

#[test]
fn test_sequence_survives_close_and_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);
    assert_eq!(storage.sequence(SEQUENCE_KEY), Some(0));

    storage.update_sequence(SEQUENCE_KEY, 5).unwrap();
    assert!(storage.flush());
    assert!(storage.close());

    assert!(storage.open());
    assert_eq!(storage.sequence(SEQUENCE_KEY), Some(5));
    assert!(storage.close());

    // A fresh manager starting from the schema placeholder also sees 5
    let mut fresh = ledger_storage(&temp_dir);
    assert!(fresh.open());
    assert_eq!(fresh.sequence(SEQUENCE_KEY), Some(5));
    assert!(fresh.close());
}

#[test]
fn test_sequence_persisted_by_close_alone() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);
    for expected in 0..4 {
        assert_eq!(storage.next_id(SEQUENCE_KEY).unwrap(), expected);
    }
    assert!(storage.close());

    assert!(storage.open());
    assert_eq!(storage.sequence(SEQUENCE_KEY), Some(4));
    assert_eq!(storage.next_id(SEQUENCE_KEY).unwrap(), 4);
    assert!(storage.close());
}

#[test]
fn test_sequence_regression_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);
    storage.update_sequence(SEQUENCE_KEY, 10).unwrap();

    let err = storage.update_sequence(SEQUENCE_KEY, 9).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::SequenceRegression { current: 10, requested: 9, .. })
    ));
    assert_eq!(storage.sequence(SEQUENCE_KEY), Some(10));

    // Equal value is not a regression
    storage.update_sequence(SEQUENCE_KEY, 10).unwrap();
    assert!(storage.close());
}

#[test]
fn test_unknown_sequence_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);

    let err = storage.update_sequence("nope", 1).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::UnknownSequence(name)) if name == "nope"
    ));
    assert!(storage.close());
}

#[test]
fn test_missing_sequence_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    drop(created_storage(&temp_dir));

    let schema = ledger_schema().with_sequence("added_later", 0);
    let mut storage = PersistentStorage::new(NAMESPACE, Arc::new(manager(&temp_dir, schema)));

    assert!(!storage.open());
    assert!(storage.is_closed());
    assert!(matches!(
        last_storage_error(&storage),
        Some(StorageError::MissingKey { key }) if key == "added_later"
    ));
}

#[test]
fn test_noop_flush_keeps_stamps() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);
    assert_eq!(storage.pending_operations(), 0);

    assert!(storage.flush());
    assert!(storage.flush());
    assert_eq!(storage.pending_operations(), 0);
    assert!(storage.close());

    let path = storage.path();
    assert_eq!(raw_version(&path, VERSION_KEY), Some(1));
    assert_eq!(raw_sequence(&path, SEQUENCE_KEY), Some(0));
}

#[test]
fn test_metadata_keys_reserved_from_data_path() {
    let temp_dir = TempDir::new().unwrap();
    let mut storage = opened_storage(&temp_dir);

    for key in [VERSION_KEY, SEQUENCE_KEY] {
        let err = storage.put(key, 2u32.encode()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::ReservedKey(name)) if name == key
        ));
        let err = storage.put_cf("default", key, 2u32.encode()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::ReservedKey(_))
        ));
    }

    // Same key in another family is ordinary data
    storage.put_cf(OBJECTS_CF, VERSION_KEY, b"payload").unwrap();
    assert_eq!(storage.pending_operations(), 1);
    assert_eq!(
        storage.get(SEQUENCE_KEY.as_bytes()).unwrap(),
        Some(0u64.encode())
    );
    assert!(storage.close());

    assert!(storage.open(), "reopen failed: {:?}", storage.last_error());
    assert_eq!(storage.sequence(SEQUENCE_KEY), Some(0));
    assert_eq!(
        storage.get_cf(OBJECTS_CF, VERSION_KEY.as_bytes()).unwrap(),
        Some(b"payload".to_vec())
    );
    assert!(storage.close());
}
