//! Pending writes staged in memory and committed as one atomic batch.

use std::collections::HashMap;

use anyhow::Result;
use rocksdb::{WriteBatch, DB, DEFAULT_COLUMN_FAMILY_NAME};

use crate::error::StorageError;

#[derive(Debug, Clone)]
struct PendingPut {
    cf: Option<String>,
    key: Vec<u8>,
    value: Vec<u8>,
}

/// Ordered pending puts with read-your-own-writes lookups.
///
/// Nothing reaches the engine until [`flush_to`](Self::flush_to), which
/// writes every staged operation in a single `WriteBatch`. A failed flush
/// leaves the buffer untouched so the caller can retry.
///
/// Not safe for concurrent population; callers serialize mutations.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    ops: Vec<PendingPut>,
    /// `(cf, key)` -> position of the latest put for that key
    index: HashMap<(Option<String>, Vec<u8>), usize>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put into the default column family.
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.push(None, key.as_ref(), value.as_ref());
    }

    /// Stage a put into a named column family.
    pub fn put_cf(&mut self, cf: &str, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.push(normalize_cf(cf), key.as_ref(), value.as_ref());
    }

    /// Latest uncommitted value for `key` in the default column family.
    pub fn get_pending(&self, key: &[u8]) -> Option<&[u8]> {
        self.lookup(None, key)
    }

    /// Latest uncommitted value for `key` in `cf`.
    pub fn get_pending_cf(&self, cf: &str, key: &[u8]) -> Option<&[u8]> {
        self.lookup(normalize_cf(cf), key)
    }

    /// Number of puts staged since the last successful flush.
    pub fn pending(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.index.clear();
    }

    /// Commit every staged put to `db` atomically, then clear.
    ///
    /// Fails without clearing when a target column family is not open on
    /// `db` or when the engine rejects the batch.
    pub fn flush_to(&mut self, db: &DB) -> Result<()> {
        let mut batch = WriteBatch::default();

        for op in &self.ops {
            match &op.cf {
                None => batch.put(&op.key, &op.value),
                Some(name) => {
                    let cf = db
                        .cf_handle(name)
                        .ok_or_else(|| StorageError::UnknownColumnFamily(name.clone()))?;
                    batch.put_cf(cf, &op.key, &op.value);
                }
            }
        }

        let count = self.ops.len();
        db.write(batch).map_err(StorageError::engine("write batch"))?;
        self.clear();

        tracing::debug!(count, "[WriteBuffer] Flushed batch");
        Ok(())
    }

    fn push(&mut self, cf: Option<String>, key: &[u8], value: &[u8]) {
        let position = self.ops.len();
        self.ops.push(PendingPut {
            cf: cf.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.index.insert((cf, key.to_vec()), position);
    }

    fn lookup(&self, cf: Option<String>, key: &[u8]) -> Option<&[u8]> {
        self.index
            .get(&(cf, key.to_vec()))
            .map(|&position| self.ops[position].value.as_slice())
    }
}

fn normalize_cf(cf: &str) -> Option<String> {
    if cf == DEFAULT_COLUMN_FAMILY_NAME {
        None
    } else {
        Some(cf.to_string())
    }
}
