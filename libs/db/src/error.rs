//! Hard-failure reasons raised beneath the public lifecycle boundary.
//!
//! Internal operations return `anyhow::Result`; the root cause is always one
//! of these variants so diagnostics can `downcast_ref::<StorageError>()` on
//! [`PersistentStorage::last_error`](crate::PersistentStorage::last_error).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The engine returned a non-ok status.
    #[error("Data access failed during {op}: {source}")]
    Engine {
        op: &'static str,
        #[source]
        source: rocksdb::Error,
    },

    /// A persisted version stamp differs from the expected one.
    #[error("Store version mismatch for `{key}`: expected {expected}, found {found}")]
    VersionMismatch { key: String, expected: u32, found: u32 },

    /// A version or sequence key expected on disk is absent.
    #[error("Persisted key `{key}` not found")]
    MissingKey { key: String },

    /// A fixed-width value had the wrong number of bytes.
    #[error("Invalid primitive encoding: expected {expected} bytes, got {actual}")]
    Codec { expected: usize, actual: usize },

    #[error("Column family not found: {0}")]
    UnknownColumnFamily(String),

    #[error("Sequence not registered: {0}")]
    UnknownSequence(String),

    /// Version stamps and sequence counters may only be written by the
    /// lifecycle layer itself.
    #[error("Key `{0}` is reserved for store metadata")]
    ReservedKey(String),

    /// Sequence counters never move backwards.
    #[error("Sequence `{key}` cannot regress from {current} to {requested}")]
    SequenceRegression {
        key: String,
        current: u64,
        requested: u64,
    },

    #[error("Storage is not opened")]
    NotOpened,

    #[error("Storage is already opened")]
    AlreadyOpened,

    #[error("Invalid storage path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("Invalid configuration {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl StorageError {
    /// Wrap an engine status for the named operation.
    pub fn engine(op: &'static str) -> impl FnOnce(rocksdb::Error) -> StorageError {
        move |source| StorageError::Engine { op, source }
    }
}
