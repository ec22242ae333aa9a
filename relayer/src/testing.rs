//! Scripted collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::blob::MemoryBlobStore;
use crate::chain_client::{ChainClient, ChainError, ChainTx, RemoteCall};
use crate::config::RelayerConfig;
use crate::dispatcher::frame::{decode_frames, push_frame};
use crate::engine::{EngineError, ExecutionEngine};
use crate::identity::KeeperIdentity;
use crate::metrics::RelayerMetrics;
use crate::orchestrator::RelayerContext;
use crate::storage::{InMemoryStore, StoreBatch};
use crate::types::{
    BlockNumber, CallIndex, Calls, Codec, EngineOutcomes, ExecutionSummary, Hash256,
    LocalMetadata, Outcome, ShardId,
};

/// In-memory ledger whose answers are set up by each test.
#[derive(Default)]
pub struct MockChain {
    pub head: AtomicU32,
    pub history: Mutex<HashMap<(ShardId, BlockNumber), Vec<CallIndex>>>,
    pub records: Mutex<HashMap<CallIndex, RemoteCall>>,
    pub blobs: Mutex<HashMap<String, String>>,
    pub members: Mutex<HashMap<ShardId, Vec<String>>>,
    pub thresholds: Mutex<HashMap<ShardId, u32>>,
    pub expiration: Mutex<Option<BlockNumber>>,
    pub confirmations: Mutex<HashMap<(ShardId, BlockNumber), u32>>,
    pub outcomes: Mutex<HashMap<(ShardId, CallIndex), Vec<u8>>>,
    pub submitted: Mutex<Vec<ChainTx>>,
    /// Calls to `call_history` for this block fail.
    pub failing_block: Mutex<Option<BlockNumber>>,
    /// Number of upcoming `submit` calls that fail.
    pub failing_submits: AtomicU32,
    pub history_queries: AtomicUsize,
}

impl MockChain {
    pub fn new(head: BlockNumber) -> Arc<Self> {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        Arc::new(chain)
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Posts `payload` as call `idx` of `shard` in `block`.
    pub fn post(&self, shard: ShardId, block: BlockNumber, idx: CallIndex, origin: &str, payload: Vec<u8>) {
        self.history
            .lock()
            .unwrap()
            .entry((shard, block))
            .or_default()
            .push(idx);
        self.records.lock().unwrap().insert(
            idx,
            RemoteCall {
                origin: origin.to_string(),
                payload,
            },
        );
    }

    /// Posts an encoded `Calls` buffer.
    pub fn post_calls(&self, block: BlockNumber, idx: CallIndex, calls: &Calls) {
        let origin = calls.ops.first().map(|c| c.origin.clone()).unwrap_or_default();
        self.post(calls.shard_id, block, idx, &origin, calls.encode().unwrap());
    }

    pub fn set_committee(&self, shard: ShardId, members: &[&str], threshold: u32) {
        self.members
            .lock()
            .unwrap()
            .insert(shard, members.iter().map(|m| m.to_string()).collect());
        self.thresholds.lock().unwrap().insert(shard, threshold);
    }

    pub fn submitted(&self) -> Vec<ChainTx> {
        self.submitted.lock().unwrap().clone()
    }
}

impl ChainClient for MockChain {
    fn block_number(&self) -> Result<BlockNumber, ChainError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    fn call_history(&self, shard: ShardId, block: BlockNumber) -> Result<Vec<CallIndex>, ChainError> {
        self.history_queries.fetch_add(1, Ordering::SeqCst);
        if *self.failing_block.lock().unwrap() == Some(block) {
            return Err(ChainError::Transport("connection reset".into()));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&(shard, block))
            .cloned()
            .unwrap_or_default())
    }

    fn call_record(&self, call_index: CallIndex) -> Result<RemoteCall, ChainError> {
        self.records
            .lock()
            .unwrap()
            .get(&call_index)
            .cloned()
            .ok_or_else(|| ChainError::Missing(format!("call {call_index}")))
    }

    fn wasm_blob_ref(&self, contract: &str) -> Result<Option<String>, ChainError> {
        Ok(self.blobs.lock().unwrap().get(contract).cloned())
    }

    fn shard_members(&self, shard: ShardId) -> Result<Vec<String>, ChainError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&shard)
            .cloned()
            .unwrap_or_default())
    }

    fn beacon_index(&self, shard: ShardId, account: &str) -> Result<Option<u32>, ChainError> {
        let members = self.shard_members(shard)?;
        Ok(members
            .iter()
            .position(|m| m == account)
            .and_then(|i| u32::try_from(i).ok()))
    }

    fn confirmation_threshold(&self, shard: ShardId) -> Result<Option<u32>, ChainError> {
        Ok(self.thresholds.lock().unwrap().get(&shard).copied())
    }

    fn registration_expiration(&self, _account: &str) -> Result<Option<BlockNumber>, ChainError> {
        Ok(*self.expiration.lock().unwrap())
    }

    fn confirmation(&self, shard: ShardId, block: BlockNumber) -> Result<u32, ChainError> {
        Ok(self
            .confirmations
            .lock()
            .unwrap()
            .get(&(shard, block))
            .copied()
            .unwrap_or(0))
    }

    fn confirmed_outcome(
        &self,
        shard: ShardId,
        call_index: CallIndex,
    ) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.outcomes.lock().unwrap().get(&(shard, call_index)).cloned())
    }

    fn submit(&self, tx: ChainTx) -> Result<(), ChainError> {
        let failing = self.failing_submits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_submits.store(failing - 1, Ordering::SeqCst);
            return Err(ChainError::Rejected("pool full".into()));
        }
        self.submitted.lock().unwrap().push(tx);
        Ok(())
    }
}

/// Deterministic engine: one outcome per frame, root chained over inputs.
#[derive(Default)]
pub struct MockEngine {
    pub invocations: AtomicUsize,
    pub fail: AtomicBool,
    pub payloads: Mutex<Vec<Vec<u8>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Root the engine derives for `body` at `call_index` on top of `prior`.
    pub fn next_root(prior: &Hash256, call_index: CallIndex, body: &[u8]) -> Hash256 {
        let mut input = prior.as_bytes().to_vec();
        input.extend_from_slice(&call_index.to_le_bytes());
        input.extend_from_slice(body);
        Hash256::compute(&input)
    }
}

impl ExecutionEngine for MockEngine {
    fn execute(&self, payload: &[u8], prior_root: &Hash256) -> Result<Vec<u8>, EngineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Unreachable("engine down".into()));
        }

        let frames =
            decode_frames(payload).map_err(|e| EngineError::MalformedOutput(e.to_string()))?;
        let mut root = *prior_root;
        let mut out = Vec::new();
        for frame in frames {
            root = Self::next_root(&root, frame.call_index, frame.body);
            let outcome = EngineOutcomes {
                ops: vec![Outcome {
                    outcome_executor_id: format!("call-{}", frame.call_index),
                    outcome_gas_burnt: frame.body.len() as u64,
                    ..Outcome::default()
                }],
                state_root: root,
                state_patch: frame.call_index.to_le_bytes().to_vec(),
            };
            let body = outcome.encode().map_err(|e| EngineError::Failed(e.to_string()))?;
            push_frame(&mut out, frame.call_index, &body)
                .map_err(|e| EngineError::Failed(e.to_string()))?;
        }
        Ok(out)
    }
}

pub const TEST_SEED: &[u8] = b"test relayer seed";

pub fn context(chain: Arc<MockChain>, engine: Arc<MockEngine>) -> RelayerContext {
    context_with(chain, engine, RelayerConfig::default())
}

pub fn context_with(
    chain: Arc<MockChain>,
    engine: Arc<MockEngine>,
    mut config: RelayerConfig,
) -> RelayerContext {
    config.indexer.fetch_retry = crate::retry::RetryPolicy::none();
    RelayerContext {
        config,
        identity: KeeperIdentity::from_seed(TEST_SEED),
        store: Arc::new(InMemoryStore::new()),
        chain,
        engine,
        blobs: Arc::new(MemoryBlobStore::new()),
        metrics: RelayerMetrics::detached().unwrap(),
    }
}

/// Writes the genesis watermarks for the configured shards.
pub fn genesis(ctx: &RelayerContext) {
    let mut batch = StoreBatch::new();
    batch
        .put_local_metadata(&LocalMetadata::genesis(ctx.config.shards.clone()))
        .unwrap();
    batch
        .put_execution_summary(&ExecutionSummary::default())
        .unwrap();
    batch.commit(ctx.store()).unwrap();
}
