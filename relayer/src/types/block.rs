//! Per-block records written by the indexer and the dispatcher.

use serde::{Deserialize, Serialize};

use super::call::Calls;
use super::codec::Codec;
use super::{BlockNumber, CallIndex, Hash256, ShardId};

/// What the indexer saw for one shard at one block height.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub shard_id: ShardId,
    pub block_number: BlockNumber,
    /// Call indexes posted in this block, in ledger order.
    pub calls: Vec<CallIndex>,
    /// Names of contracts deployed in this block. Empty when none.
    pub contracts: Vec<String>,
}

impl Block {
    pub fn empty(shard_id: ShardId, block_number: BlockNumber) -> Self {
        Self {
            shard_id,
            block_number,
            ..Self::default()
        }
    }

    /// Sum of the call indexes, widened so it cannot overflow.
    pub fn call_index_sum(&self) -> u64 {
        self.calls.iter().map(|&i| u64::from(i)).sum()
    }
}

impl Codec for Block {}

/// Execution result of a whole block, written once the block is executed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block_number: BlockNumber,
    pub state_root: Hash256,
    pub contract_state_patch: Vec<u8>,
    pub call_state_patch: Vec<u8>,
}

impl Codec for BlockSummary {}

/// A deployed confidential contract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub home_shard: ShardId,
    /// Blob-store reference of the contract code.
    pub wasm_blob_path: String,
    pub deployment_calls: Calls,
    pub deployment_call_index: CallIndex,
}

impl Codec for Contract {}
