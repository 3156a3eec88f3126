//! Engine option factories and tunables.
//!
//! - `StorageOptions`: default RocksDB options per lifecycle step
//! - `BlockCacheConfig`: per-column-family block-based table tuning
//! - `EngineConfig`: optional JSON overrides read from a namespace's config file

use std::path::Path;

use anyhow::Result;
use rocksdb::{BlockBasedOptions, Cache, Options};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

// ============================================================================
// StorageOptions
// ============================================================================

/// Default RocksDB options for each way the lifecycle manager opens a store.
pub struct StorageOptions;

impl StorageOptions {
    /// Options for creating a fresh store.
    ///
    /// Column families are created explicitly afterwards, so missing ones
    /// are never created implicitly.
    pub fn default_for_create() -> Options {
        let mut options = Options::default();
        options.set_error_if_exists(false);
        options.create_if_missing(true);
        options.create_missing_column_families(false);
        options.increase_parallelism(available_parallelism());
        options.optimize_level_style_compaction(512 * 1024 * 1024);
        options
    }

    /// Options for the read-only existence probe.
    pub fn default_for_readonly() -> Options {
        let mut options = Options::default();
        options.set_error_if_exists(false);
        options.create_if_missing(false);
        options.create_missing_column_families(false);
        options
    }

    /// Options for opening an existing store for use.
    ///
    /// The store and all of its column families must already exist.
    pub fn default_for_readwrite() -> Options {
        let mut options = Options::default();
        options.set_error_if_exists(false);
        options.create_if_missing(false);
        options.create_missing_column_families(false);
        options
    }
}

fn available_parallelism() -> i32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as i32)
        .unwrap_or(4)
}

// ============================================================================
// BlockCacheConfig
// ============================================================================

/// Default size of the block cache a provider shares across all of its
/// column families. 64MB.
pub const DEFAULT_BLOCK_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Block-based table tuning applied to a column family.
///
/// The block cache itself is not per family: every family of a provider
/// reads through the one [`Cache`] handed to [`BlockCacheConfig::cf_options`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockCacheConfig {
    /// Data block size. Default: 4KB.
    pub block_size: usize,

    /// Keep index and filter blocks in the block cache. Default: true.
    pub cache_index_and_filter_blocks: bool,

    /// Pin L0 filter and index blocks. Default: true.
    pub pin_l0_filter_and_index: bool,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024, // 4KB
            cache_index_and_filter_blocks: true,
            pin_l0_filter_and_index: true,
        }
    }
}

impl BlockCacheConfig {
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    /// Column family options reading through the shared `cache`.
    pub fn cf_options(&self, cache: &Cache) -> Options {
        let mut table = BlockBasedOptions::default();
        table.set_block_cache(cache);
        table.set_block_size(self.block_size);
        table.set_cache_index_and_filter_blocks(self.cache_index_and_filter_blocks);
        table.set_pin_l0_filter_and_index_blocks_in_cache(self.pin_l0_filter_and_index);

        let mut options = Options::default();
        options.set_block_based_table_factory(&table);
        options
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine-level overrides loaded from a namespace's config file.
///
/// Every field is optional; unset fields keep the defaults from
/// [`StorageOptions`].
///
/// ```json
/// { "max_open_files": 512, "write_buffer_size": 67108864 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_open_files: Option<i32>,
    pub write_buffer_size: Option<usize>,
    pub max_write_buffer_number: Option<i32>,
    pub max_background_jobs: Option<i32>,
    /// Background thread count. Defaults to the available CPU count.
    pub parallelism: Option<i32>,
}

impl EngineConfig {
    /// Read and parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| StorageError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = serde_json::from_str(&text).map_err(|e| StorageError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Apply the overrides to `options`, including parallelism.
    pub fn apply(&self, options: &mut Options) {
        options.increase_parallelism(self.parallelism.unwrap_or_else(available_parallelism));
        if let Some(n) = self.max_open_files {
            options.set_max_open_files(n);
        }
        if let Some(size) = self.write_buffer_size {
            options.set_write_buffer_size(size);
        }
        if let Some(n) = self.max_write_buffer_number {
            options.set_max_write_buffer_number(n);
        }
        if let Some(n) = self.max_background_jobs {
            options.set_max_background_jobs(n);
        }
    }
}
