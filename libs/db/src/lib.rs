//! Versioned lifecycle management for column-family RocksDB stores.
//!
//! The crate sits in front of an embedded RocksDB instance and makes opening
//! a durable store safe and idempotent:
//!
//! - [`PersistentStorage`]: create / open / flush / close state machine
//! - [`SchemaProvider`]: per-namespace column families, path, version stamps
//!   and sequence counters, supplied by the store's owner
//! - [`StorageConfigurationManager`]: a ready-made, JSON-loadable provider
//! - [`WriteBuffer`]: batched writes with read-your-own-writes lookups
//! - [`ColumnFamilyRegistry`]: the set of families held open on a handle
//! - [`PrimitiveCodec`]: fixed-width encoding of version and sequence values

mod codec;
mod config;
mod error;
mod manager;
mod provider;
mod registry;
mod storage;
mod write_buffer;

// Re-exports
pub use codec::PrimitiveCodec;
pub use config::{BlockCacheConfig, EngineConfig, StorageOptions, DEFAULT_BLOCK_CACHE_BYTES};
pub use error::StorageError;
pub use manager::{ColumnFamilySpec, NamespaceSchema, StorageConfigurationManager};
pub use provider::{
    ColumnDefinition, ColumnDefinitionsPreparer, DefinitionMode, SchemaProvider, SequenceMap,
    VersionMap,
};
pub use registry::ColumnFamilyRegistry;
pub use storage::{PersistentStorage, StorageState};
pub use write_buffer::WriteBuffer;
