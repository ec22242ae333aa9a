//! Dispatcher: executes indexed blocks through the execution engine.
//!
//! Blocks are executed strictly in order, once each. For every block the
//! dispatcher validates the calls, frames them into one engine batch per
//! shard, persists the returned outcomes and a `BlockSummary` with the
//! rolling state root, and advances the execution watermark. All writes of
//! a block go into one atomic batch, so a failure at any point leaves the
//! block dispatchable and nothing of it visible.

pub mod frame;

use std::collections::BTreeMap;
use std::time::Instant;

use crate::engine::EngineError;
use crate::error::{RelayerError, Result};
use crate::orchestrator::RelayerContext;
use crate::storage::{StoreBatch, StoreExt, keys};
use crate::types::{
    BlockNumber, BlockSummary, Call, CallAction, CallIndex, CallPayload, CallRecord, Calls, Codec,
    EngineOutcomes, ExecutionSummary, Hash256, ShardId,
};

use frame::{decode_frames, push_frame};

/// Store writes and resulting root of one engine batch.
#[derive(Debug)]
pub struct DispatchedBatch {
    pub ops: StoreBatch,
    pub state_root: Hash256,
    /// Call-state patch of the last outcome frame.
    pub call_state_patch: Vec<u8>,
}

/// Stateless block executor; everything it needs comes from the context.
#[derive(Debug, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Whether `block` is above the execution watermark.
    ///
    /// Callers must check this before executing a block.
    pub fn is_dispatchable(&self, ctx: &RelayerContext, block: BlockNumber) -> Result<bool> {
        let summary = ctx.store().execution_summary()?;
        Ok(summary.high_local_execution_block < block)
    }

    /// Validates one call before execution.
    ///
    /// `create_account` and `deploy` require the root origin, `transfer` is
    /// always refused, and `deploy` gets its contract code inlined from the
    /// blob store.
    pub fn pre_process_call(&self, ctx: &RelayerContext, mut call: Call) -> Result<Call> {
        match call.action {
            CallAction::CreateAccount => {
                self.require_root(ctx, &call)?;
                Ok(call)
            }
            CallAction::Deploy => {
                self.require_root(ctx, &call)?;
                let reference = ctx
                    .chain
                    .wasm_blob_ref(&call.receiver)?
                    .or_else(|| call.wasm_blob_path.clone())
                    .ok_or_else(|| RelayerError::MissingCode {
                        contract: call.receiver.clone(),
                    })?;
                call.wasm_code = Some(ctx.blobs.get(&reference)?);
                call.wasm_blob_path = Some(reference);
                Ok(call)
            }
            CallAction::Transfer => Err(RelayerError::TransferNotPermitted {
                origin: call.origin,
            }),
            CallAction::FunctionCall | CallAction::ViewCall => Ok(call),
        }
    }

    fn require_root(&self, ctx: &RelayerContext, call: &Call) -> Result<()> {
        if call.origin == ctx.config.dispatcher.root_origin {
            Ok(())
        } else {
            Err(RelayerError::Authorization {
                origin: call.origin.clone(),
                action: call.action,
            })
        }
    }

    /// Filters the ops of a parsed payload; opaque payloads pass unchanged.
    ///
    /// Rejected calls are dropped and counted. A payload whose every op is
    /// rejected is still sent, as an empty batch, so its call index gets an
    /// outcome.
    fn prepare_payload(
        &self,
        ctx: &RelayerContext,
        shard: ShardId,
        record: CallRecord,
    ) -> Result<CallPayload> {
        let calls = match record.payload {
            CallPayload::Parsed(calls) => calls,
            opaque @ CallPayload::Opaque(_) => return Ok(opaque),
        };

        let mut accepted = Vec::with_capacity(calls.ops.len());
        for call in calls.ops {
            match self.pre_process_call(ctx, call) {
                Ok(call) => accepted.push(call),
                Err(e) if e.is_call_rejection() => {
                    ctx.metrics.calls_rejected.inc();
                    tracing::warn!(shard, call_index = record.call_index, reason = %e, "call dropped");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(shard, call_index = record.call_index, ops = accepted.len(), "call validated");
        Ok(CallPayload::Parsed(Calls {
            ops: accepted,
            shard_id: calls.shard_id,
            block_number: calls.block_number,
        }))
    }

    /// Executes validated payloads of one shard and block in a single
    /// engine invocation.
    ///
    /// Frames are sent in ascending call-index order. The returned batch
    /// holds one `Outcomes` record per outcome frame; the root of the last
    /// frame becomes the block root. With no payloads the engine is not
    /// invoked and the prior root is kept.
    pub fn dispatch_batch(
        &self,
        ctx: &RelayerContext,
        shard: ShardId,
        calls_by_index: &BTreeMap<CallIndex, CallPayload>,
        prior_root: &Hash256,
    ) -> Result<DispatchedBatch> {
        let mut batch = DispatchedBatch {
            ops: StoreBatch::new(),
            state_root: *prior_root,
            call_state_patch: Vec::new(),
        };
        if calls_by_index.is_empty() {
            return Ok(batch);
        }

        let mut payload = Vec::new();
        for (&call_index, call) in calls_by_index {
            push_frame(&mut payload, call_index, &call.to_wire()?)?;
        }

        let started = Instant::now();
        let output = ctx.engine.execute(&payload, prior_root)?;
        ctx.metrics
            .engine_call_seconds
            .observe(started.elapsed().as_secs_f64());

        let frames = decode_frames(&output)
            .map_err(|e| EngineError::MalformedOutput(e.to_string()))?;
        for frame in frames {
            if !calls_by_index.contains_key(&frame.call_index) {
                return Err(EngineError::MalformedOutput(format!(
                    "outcome for unknown call index {}",
                    frame.call_index
                ))
                .into());
            }
            let decoded = EngineOutcomes::decode(frame.body).map_err(|e| {
                EngineError::MalformedOutput(format!("call {}: {e}", frame.call_index))
            })?;
            let (outcomes, patch) = decoded.into_parts();
            batch.state_root = outcomes.state_root;
            batch.call_state_patch = patch;
            batch.ops.put_outcomes(shard, frame.call_index, &outcomes)?;
        }

        Ok(batch)
    }

    /// Root the block is executed on: the root of the previous block.
    fn prior_root(&self, ctx: &RelayerContext, shard: ShardId, block: BlockNumber) -> Result<Hash256> {
        let Some(previous) = block.checked_sub(1) else {
            return Ok(Hash256::ZERO);
        };
        match ctx
            .store()
            .find_record::<BlockSummary>(&keys::block_summary(shard, previous))?
        {
            Some(summary) => Ok(summary.state_root),
            None if previous == 0 => Ok(Hash256::ZERO),
            None => Err(RelayerError::Corruption(format!(
                "shard {shard} block {block} has no executed predecessor"
            ))),
        }
    }

    /// Executes `block` for every owned shard and commits it atomically.
    ///
    /// Returns `false` without doing anything when the block was already
    /// executed or is not indexed yet.
    pub fn dispatch_block(&self, ctx: &RelayerContext, block: BlockNumber) -> Result<bool> {
        if !self.is_dispatchable(ctx, block)? {
            return Ok(false);
        }
        let store = ctx.store();
        let meta = store.local_metadata()?;
        if block > meta.high_local_block {
            return Ok(false);
        }

        let mut batch = StoreBatch::new();
        let mut primary_root = None;

        for &shard in &meta.shard_id {
            let record = store.block(shard, block)?;
            let prior_root = self.prior_root(ctx, shard, block)?;

            let summary = if record.calls.is_empty() {
                BlockSummary {
                    block_number: block,
                    state_root: prior_root,
                    ..BlockSummary::default()
                }
            } else {
                let mut calls_by_index = BTreeMap::new();
                for &call_index in &record.calls {
                    let call = store.call_record(shard, call_index)?;
                    calls_by_index.insert(call_index, self.prepare_payload(ctx, shard, call)?);
                }

                tracing::info!(shard, block, calls = calls_by_index.len(), "dispatching block");
                let mut dispatched = self.dispatch_batch(ctx, shard, &calls_by_index, &prior_root)?;
                batch.append(&mut dispatched.ops);
                BlockSummary {
                    block_number: block,
                    state_root: dispatched.state_root,
                    contract_state_patch: Vec::new(),
                    call_state_patch: dispatched.call_state_patch,
                }
            };

            primary_root.get_or_insert(summary.state_root);
            batch.put_block_summary(shard, &summary)?;
        }

        let mut meta = store.local_metadata()?;
        if let Some(root) = primary_root {
            meta.latest_state_root = root;
        }
        batch.put_local_metadata(&meta)?;
        batch.put_execution_summary(&ExecutionSummary {
            high_local_execution_block: block,
        })?;
        batch.commit(store)?;

        ctx.metrics.blocks_executed.inc();
        ctx.metrics.execution_watermark.set(i64::from(block));
        tracing::debug!(block, "block executed");
        Ok(true)
    }

    /// Executes every indexed block above the execution watermark.
    ///
    /// Stops at the first block that fails; it stays dispatchable.
    pub fn dispatch(&self, ctx: &RelayerContext) -> Result<u32> {
        let store = ctx.store();
        let from = store.execution_summary()?.high_local_execution_block;
        let to = store.local_metadata()?.high_local_block;

        let mut executed = 0;
        for block in from.saturating_add(1)..=to {
            if self.dispatch_block(ctx, block)? {
                executed += 1;
            }
        }
        Ok(executed)
    }
}
