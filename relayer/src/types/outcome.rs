//! Execution outcomes returned by the engine.

use serde::{Deserialize, Serialize};

use super::codec::Codec;
use super::{HASH_LEN, Hash256};

/// Result of executing one [`crate::types::Call`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub view_result_log: Vec<String>,
    pub view_result: Option<Vec<u8>>,
    pub outcome_logs: Vec<String>,
    pub outcome_receipt_ids: Vec<[u8; HASH_LEN]>,
    pub outcome_gas_burnt: u64,
    pub outcome_token_burnt: u128,
    pub outcome_executor_id: String,
    pub outcome_status: Option<Vec<u8>>,
}

/// Outcomes of one call index plus the state root after applying them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcomes {
    pub ops: Vec<Outcome>,
    pub state_root: Hash256,
}

impl Codec for Outcomes {}

/// Body of one outcome frame produced by the execution engine.
///
/// On top of [`Outcomes`] it carries the call-state patch relative to the
/// previous state root. Only the patch of the last frame in a block is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOutcomes {
    pub ops: Vec<Outcome>,
    pub state_root: Hash256,
    pub state_patch: Vec<u8>,
}

impl Codec for EngineOutcomes {}

impl EngineOutcomes {
    /// Splits the frame body into the persisted record and the state patch.
    pub fn into_parts(self) -> (Outcomes, Vec<u8>) {
        (
            Outcomes {
                ops: self.ops,
                state_root: self.state_root,
            },
            self.state_patch,
        )
    }
}
