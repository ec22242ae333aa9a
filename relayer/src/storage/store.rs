//! Storage abstraction shared by every pipeline component.

use super::StorageError;

/// One write of a batch. Records are only ever appended or overwritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOp {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StoreOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Abstract key-value store.
///
/// Implementations must apply [`Store::write_batch`] atomically: either
/// every op of the batch becomes visible or none does. Reads observe all
/// previously committed batches.
pub trait Store: Send + Sync {
    /// Fetches the raw value under `key`, if present.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Commits `ops` as one atomic batch.
    fn write_batch(&self, ops: Vec<StoreOp>) -> Result<(), StorageError>;

    /// Writes a single key.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.write_batch(vec![StoreOp::put(key, value)])
    }
}
