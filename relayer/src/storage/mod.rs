//! Durable key-value storage for relayer records.
//!
//! This module provides:
//!
//! - the [`Store`] abstraction (get / put / atomic batch),
//! - the deterministic key layout ([`keys`]),
//! - typed record access and buffered batches ([`records`]),
//! - an in-memory backend ([`mem::InMemoryStore`]) used by tests,
//! - a RocksDB backend ([`rocksdb::RocksDbStore`]) for relayer processes.

pub mod keys;
pub mod mem;
pub mod records;
pub mod rocksdb;
pub mod store;

use thiserror::Error;

use crate::types::EncodingError;

pub use mem::InMemoryStore;
pub use records::{StoreBatch, StoreExt};
pub use self::rocksdb::{RocksDbConfig, RocksDbStore};
pub use store::{Store, StoreOp};

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] ::rocksdb::Error),
    /// Another process holds the database lock.
    #[error("store at {path} is already open in another process")]
    Locked { path: String },
    #[error("missing column family {0:?}")]
    MissingColumnFamily(&'static str),
    /// The key has never been written.
    #[error("record not found: {key}")]
    NotFound { key: String },
    /// The key exists but its value is not a valid record.
    #[error("corrupted record at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: EncodingError,
    },
    #[error("failed to encode record for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: EncodingError,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
