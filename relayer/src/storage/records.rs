//! Typed record access on top of a raw [`Store`].

use crate::types::{
    Block, BlockNumber, BlockSummary, CallIndex, CallRecord, Codec, Contract, ExecutionSummary,
    LocalMetadata, Outcomes, Shard, ShardId, ShardMetadata,
};

use super::{Store, StorageError, StoreOp, keys};

/// Typed getters for every record kind.
///
/// Missing keys surface as [`StorageError::NotFound`]; keys holding bytes
/// that do not decode surface as [`StorageError::Decode`].
pub trait StoreExt: Store {
    fn get_record<T: Codec>(&self, key: &[u8]) -> Result<T, StorageError> {
        let bytes = self.get(key)?.ok_or_else(|| StorageError::NotFound {
            key: keys::display(key),
        })?;
        T::decode(&bytes).map_err(|source| StorageError::Decode {
            key: keys::display(key),
            source,
        })
    }

    /// Like [`StoreExt::get_record`] but maps `NotFound` to `None`.
    fn find_record<T: Codec>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.get_record(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_metadata(&self) -> Result<LocalMetadata, StorageError> {
        self.get_record(keys::LOCAL_METADATA)
    }

    fn execution_summary(&self) -> Result<ExecutionSummary, StorageError> {
        self.get_record(keys::EXECUTION_SUMMARY)
    }

    fn block(&self, shard: ShardId, block: BlockNumber) -> Result<Block, StorageError> {
        self.get_record(&keys::block(shard, block))
    }

    fn block_summary(
        &self,
        shard: ShardId,
        block: BlockNumber,
    ) -> Result<BlockSummary, StorageError> {
        self.get_record(&keys::block_summary(shard, block))
    }

    fn call_record(&self, shard: ShardId, call_index: CallIndex) -> Result<CallRecord, StorageError> {
        self.get_record(&keys::call(shard, call_index))
    }

    fn outcomes(&self, shard: ShardId, call_index: CallIndex) -> Result<Outcomes, StorageError> {
        self.get_record(&keys::outcomes(shard, call_index))
    }

    fn contract(&self, shard: ShardId, name: &str) -> Result<Contract, StorageError> {
        self.get_record(&keys::contract(shard, name))
    }

    fn shard(&self, shard: ShardId) -> Result<Shard, StorageError> {
        self.get_record(&keys::shard(shard))
    }

    fn shard_metadata(&self, shard: ShardId) -> Result<ShardMetadata, StorageError> {
        self.get_record(&keys::shard_metadata(shard))
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Buffer of pending writes, committed atomically in one batch.
///
/// Later writes to the same key win, both inside the buffer and once
/// committed, because ops are applied in insertion order.
#[derive(Debug, Default)]
pub struct StoreBatch {
    ops: Vec<StoreOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes and queues `record` under `key`.
    pub fn put<T: Codec>(&mut self, key: Vec<u8>, record: &T) -> Result<(), StorageError> {
        let value = record.encode().map_err(|source| StorageError::Encode {
            key: keys::display(&key),
            source,
        })?;
        self.ops.push(StoreOp { key, value });
        Ok(())
    }

    pub fn put_call_record(&mut self, shard: ShardId, record: &CallRecord) -> Result<(), StorageError> {
        self.put(keys::call(shard, record.call_index), record)
    }

    pub fn put_outcomes(
        &mut self,
        shard: ShardId,
        call_index: CallIndex,
        outcomes: &Outcomes,
    ) -> Result<(), StorageError> {
        self.put(keys::outcomes(shard, call_index), outcomes)
    }

    pub fn put_block(&mut self, block: &Block) -> Result<(), StorageError> {
        self.put(keys::block(block.shard_id, block.block_number), block)
    }

    pub fn put_block_summary(
        &mut self,
        shard: ShardId,
        summary: &BlockSummary,
    ) -> Result<(), StorageError> {
        self.put(keys::block_summary(shard, summary.block_number), summary)
    }

    pub fn put_contract(&mut self, name: &str, contract: &Contract) -> Result<(), StorageError> {
        self.put(keys::contract(contract.home_shard, name), contract)
    }

    pub fn put_shard(&mut self, shard: ShardId, record: &Shard) -> Result<(), StorageError> {
        self.put(keys::shard(shard), record)
    }

    pub fn put_shard_metadata(
        &mut self,
        shard: ShardId,
        meta: &ShardMetadata,
    ) -> Result<(), StorageError> {
        self.put(keys::shard_metadata(shard), meta)
    }

    pub fn put_local_metadata(&mut self, meta: &LocalMetadata) -> Result<(), StorageError> {
        self.put(keys::LOCAL_METADATA.to_vec(), meta)
    }

    pub fn put_execution_summary(&mut self, summary: &ExecutionSummary) -> Result<(), StorageError> {
        self.put(keys::EXECUTION_SUMMARY.to_vec(), summary)
    }

    /// Moves every op of `other` to the end of this batch.
    pub fn append(&mut self, other: &mut StoreBatch) {
        self.ops.append(&mut other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commits every queued op atomically and leaves the batch empty.
    ///
    /// On failure the ops are kept so the caller may retry.
    pub fn commit(&mut self, store: &dyn Store) -> Result<(), StorageError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        store.write_batch(self.ops.clone())?;
        self.ops.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::Hash256;

    #[test]
    fn missing_and_corrupted_records_are_distinct() {
        let store = InMemoryStore::new();
        let err = store.local_metadata().unwrap_err();
        assert!(err.is_not_found());

        store.put(keys::LOCAL_METADATA, &[0xFF, 0xFF, 0xFF]).unwrap();
        let err = store.local_metadata().unwrap_err();
        assert!(matches!(err, StorageError::Decode { .. }));
    }

    #[test]
    fn batch_commit_writes_all_records_and_empties_buffer() {
        let store = InMemoryStore::new();
        let mut batch = StoreBatch::new();
        batch.put_block(&Block::empty(0, 5)).unwrap();
        batch
            .put_block_summary(
                0,
                &BlockSummary {
                    block_number: 5,
                    state_root: Hash256::compute(b"5"),
                    ..BlockSummary::default()
                },
            )
            .unwrap();
        batch
            .put_execution_summary(&ExecutionSummary {
                high_local_execution_block: 5,
            })
            .unwrap();
        assert_eq!(batch.len(), 3);

        batch.commit(&store).unwrap();
        assert!(batch.is_empty());
        assert_eq!(store.block(0, 5).unwrap(), Block::empty(0, 5));
        assert_eq!(store.execution_summary().unwrap().high_local_execution_block, 5);
        assert_eq!(
            store.block_summary(0, 5).unwrap().state_root,
            Hash256::compute(b"5")
        );
    }

    #[test]
    fn find_record_maps_missing_to_none() {
        let store = InMemoryStore::new();
        let found: Option<Shard> = store.find_record(&keys::shard(0)).unwrap();
        assert!(found.is_none());
    }
}
