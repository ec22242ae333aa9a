//! In-memory store.
//!
//! Useful for unit tests and dry runs. Values live in a `BTreeMap` behind a
//! `RwLock`; a batch is applied while holding the write lock, so readers
//! never observe half of it.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{StorageError, Store, StoreOp};

/// In-memory implementation of [`Store`].
#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let values = self.values.read().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<StoreOp>) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        for op in ops {
            values.insert(op.key, op.value);
        }
        Ok(())
    }
}
