//! Query and transaction façade over the remote ledger.
//!
//! The relayer only needs a narrow slice of the ledger: call history per
//! shard and block, call payloads, committee information, and a way to
//! submit a handful of transaction kinds. [`ChainClient`] captures that
//! slice so components can be exercised against scripted clients in tests
//! and against [`http::HttpChainClient`] in production.

pub mod http;
pub mod scalar;

use thiserror::Error;

use crate::types::{BlockNumber, CallIndex, Calls, Codec, EncodingError, Hash256, ShardId};

pub use http::{ChainClientConfig, HttpChainClient};

/// Errors surfaced by a [`ChainClient`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// The ledger endpoint could not be reached.
    #[error("ledger transport error: {0}")]
    Transport(String),
    /// The ledger answered with something this client cannot interpret.
    #[error("ledger protocol error: {0}")]
    Protocol(String),
    /// The ledger rejected the request.
    #[error("ledger rejected request: {0}")]
    Rejected(String),
    /// A value the relayer depends on is absent on the ledger.
    #[error("missing ledger value: {0}")]
    Missing(String),
}

/// A call as stored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCall {
    pub origin: String,
    /// Encoded `Calls` buffer, or bytes sealed for the execution engine.
    pub payload: Vec<u8>,
}

/// Transactions the relayer sends to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainTx {
    /// Report the outcomes of an executed block.
    SubmitOutcome {
        block_number: BlockNumber,
        shard_id: ShardId,
        state_root: Hash256,
        call_indexes: Vec<CallIndex>,
        outcomes: Vec<Vec<u8>>,
    },
    /// First registration of this node as a committee member.
    RegisterSecretKeeper {
        public_key: Hash256,
        attestation: Vec<u8>,
    },
    /// Renewal of an expiring registration.
    RenewRegistration {
        public_key: Hash256,
        attestation: Vec<u8>,
    },
    /// Announce that this node runs `shard_id`.
    RegisterRunningShard { shard_id: ShardId },
    /// Post an encoded `Calls` buffer.
    PushCall { shard_id: ShardId, calls: Vec<u8> },
    /// Several transactions applied in order.
    Batch(Vec<ChainTx>),
}

impl ChainTx {
    /// Builds a `push_call` transaction carrying the encoded `calls`.
    pub fn push_call(shard_id: ShardId, calls: &Calls) -> Result<ChainTx, EncodingError> {
        Ok(ChainTx::PushCall {
            shard_id,
            calls: calls.encode()?,
        })
    }

    /// Wraps `txs` into a single batch. A single transaction is sent as is.
    pub fn batch(mut txs: Vec<ChainTx>) -> ChainTx {
        if txs.len() == 1 {
            if let Some(tx) = txs.pop() {
                return tx;
            }
        }
        ChainTx::Batch(txs)
    }

    /// Name of the ledger call this transaction maps to.
    pub fn method(&self) -> &'static str {
        match self {
            ChainTx::SubmitOutcome { .. } => "submit_outcome",
            ChainTx::RegisterSecretKeeper { .. } => "register_secret_keeper",
            ChainTx::RenewRegistration { .. } => "renew_registration",
            ChainTx::RegisterRunningShard { .. } => "register_running_shard",
            ChainTx::PushCall { .. } => "push_call",
            ChainTx::Batch(_) => "batch",
        }
    }
}

/// Narrow, blocking interface to the remote ledger.
///
/// Implementations decode every scalar before returning it; absent or
/// malformed values map to `None` or to a [`ChainError`], never to a panic.
pub trait ChainClient: Send + Sync {
    /// Current head height.
    fn block_number(&self) -> Result<BlockNumber, ChainError>;

    /// Call indexes posted for `shard` in `block`, in ledger order.
    fn call_history(&self, shard: ShardId, block: BlockNumber)
    -> Result<Vec<CallIndex>, ChainError>;

    /// Payload and origin of one call.
    fn call_record(&self, call_index: CallIndex) -> Result<RemoteCall, ChainError>;

    /// Blob-store reference of a deployed contract's code.
    fn wasm_blob_ref(&self, contract: &str) -> Result<Option<String>, ChainError>;

    /// Ordered committee of `shard`.
    fn shard_members(&self, shard: ShardId) -> Result<Vec<String>, ChainError>;

    /// Position of `account` in the committee of `shard`.
    fn beacon_index(&self, shard: ShardId, account: &str) -> Result<Option<u32>, ChainError>;

    /// Confirmation threshold of `shard`.
    fn confirmation_threshold(&self, shard: ShardId) -> Result<Option<u32>, ChainError>;

    /// Block at which the registration of `account` expires, if registered.
    fn registration_expiration(&self, account: &str) -> Result<Option<BlockNumber>, ChainError>;

    /// Number of committee confirmations recorded for a block.
    fn confirmation(&self, shard: ShardId, block: BlockNumber) -> Result<u32, ChainError>;

    /// Confirmed encoded outcome of a call, if one was confirmed.
    fn confirmed_outcome(
        &self,
        shard: ShardId,
        call_index: CallIndex,
    ) -> Result<Option<Vec<u8>>, ChainError>;

    /// Sends one transaction, signed as this node.
    fn submit(&self, tx: ChainTx) -> Result<(), ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_call_carries_encoded_calls() {
        let tx = ChainTx::push_call(2, &Calls::default()).expect("encode");
        assert_eq!(
            tx,
            ChainTx::PushCall {
                shard_id: 2,
                calls: Vec::new(),
            }
        );
        assert_eq!(tx.method(), "push_call");
    }

    #[test]
    fn batch_of_one_is_unwrapped() {
        let tx = ChainTx::RegisterRunningShard { shard_id: 0 };
        assert_eq!(ChainTx::batch(vec![tx.clone()]), tx);
    }

    #[test]
    fn batch_keeps_order() {
        let txs = vec![
            ChainTx::RegisterRunningShard { shard_id: 0 },
            ChainTx::RegisterRunningShard { shard_id: 1 },
        ];
        match ChainTx::batch(txs.clone()) {
            ChainTx::Batch(inner) => assert_eq!(inner, txs),
            other => panic!("expected batch, got {other:?}"),
        }
        assert_eq!(ChainTx::batch(Vec::new()).method(), "batch");
    }
}
