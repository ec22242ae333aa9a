//! Shard-level bookkeeping and the two watermark singletons.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codec::Codec;
use super::{BlockNumber, Hash256, ShardId};

/// Remote progress of a shard as last observed by the submitter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub high_remote_synced_block_index: BlockNumber,
    pub high_remote_confirmed_block_index: BlockNumber,
}

impl Codec for Shard {}

/// Violations of the [`ShardMetadata`] invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardMetadataError {
    #[error("shard has no committee members")]
    EmptyCommittee,
    #[error("beacon index {index} out of range for committee of {size}")]
    BeaconIndexOutOfRange { index: u32, size: usize },
    #[error("threshold {threshold} out of range for committee of {size}")]
    ThresholdOutOfRange { threshold: u32, size: usize },
}

/// Committee description of a shard, from this node's point of view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub shard_key: Hash256,
    /// Ordered committee identities.
    pub shard_members: Vec<String>,
    /// This node's position in `shard_members`.
    pub beacon_index: u32,
    /// Number of consecutive members that are on-turn for a block.
    pub threshold: u32,
}

impl ShardMetadata {
    pub fn committee_size(&self) -> usize {
        self.shard_members.len()
    }

    /// Checks `beacon_index < len(members)` and `1 <= threshold <= len(members)`.
    pub fn validate(&self) -> Result<(), ShardMetadataError> {
        let size = self.committee_size();
        if size == 0 {
            return Err(ShardMetadataError::EmptyCommittee);
        }
        if self.beacon_index as usize >= size {
            return Err(ShardMetadataError::BeaconIndexOutOfRange {
                index: self.beacon_index,
                size,
            });
        }
        if self.threshold == 0 || self.threshold as usize > size {
            return Err(ShardMetadataError::ThresholdOutOfRange {
                threshold: self.threshold,
                size,
            });
        }
        Ok(())
    }
}

impl Codec for ShardMetadata {}

/// Index watermark and rolling state root of this relayer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMetadata {
    /// Shards owned by this relayer.
    pub shard_id: Vec<ShardId>,
    /// Last block whose `Block` record is durably persisted.
    pub high_local_block: BlockNumber,
    pub latest_state_root: Hash256,
}

impl LocalMetadata {
    pub fn genesis(shards: Vec<ShardId>) -> Self {
        Self {
            shard_id: shards,
            high_local_block: 0,
            latest_state_root: Hash256::ZERO,
        }
    }
}

impl Codec for LocalMetadata {}

/// Execution watermark: last block whose `BlockSummary` is durably persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub high_local_execution_block: BlockNumber,
}

impl Codec for ExecutionSummary {}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("member-{i}")).collect()
    }

    #[test]
    fn shard_metadata_invariants() {
        let mut meta = ShardMetadata {
            shard_key: Hash256::ZERO,
            shard_members: committee(3),
            beacon_index: 2,
            threshold: 3,
        };
        assert_eq!(meta.validate(), Ok(()));

        meta.beacon_index = 3;
        assert!(matches!(
            meta.validate(),
            Err(ShardMetadataError::BeaconIndexOutOfRange { index: 3, size: 3 })
        ));

        meta.beacon_index = 0;
        meta.threshold = 0;
        assert!(matches!(
            meta.validate(),
            Err(ShardMetadataError::ThresholdOutOfRange { .. })
        ));

        meta.shard_members.clear();
        assert_eq!(meta.validate(), Err(ShardMetadataError::EmptyCommittee));
    }

    #[test]
    fn genesis_metadata_starts_at_zero() {
        let meta = LocalMetadata::genesis(vec![0, 1]);
        assert_eq!(meta.high_local_block, 0);
        assert_eq!(meta.latest_state_root, Hash256::ZERO);
        let bytes = meta.encode().expect("encode");
        assert_eq!(LocalMetadata::decode(&bytes).expect("decode"), meta);
    }
}
