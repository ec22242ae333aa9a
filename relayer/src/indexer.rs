//! Indexer: pulls calls from the ledger into the local store.
//!
//! For every owned shard and every block below the ledger head, the
//! indexer fetches the call-index list and each call's payload, stores the
//! payload (parsed when it is a well-formed `Calls` buffer, opaque
//! otherwise), records contracts deployed in the block, and writes a
//! `Block` record, also for empty blocks. Writes are buffered and flushed
//! together with the index watermark, either every `flush_every` blocks or
//! when the head is reached.

use crate::chain_client::ChainError;
use crate::error::{RelayerError, Result};
use crate::orchestrator::RelayerContext;
use crate::storage::{StoreBatch, StoreExt, keys};
use crate::types::{
    Block, BlockNumber, CallAction, CallPayload, CallRecord, Contract, ExecutionSummary,
    LocalMetadata, ShardId, ShardMetadata,
};

/// Outcome of one [`Indexer::fetch`] pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexProgress {
    /// Blocks fetched during the pass.
    pub indexed: u32,
    /// Index watermark after the pass.
    pub watermark: BlockNumber,
}

/// Buffered block indexer.
#[derive(Debug, Default)]
pub struct Indexer {
    pending: StoreBatch,
    since_flush: u32,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the genesis watermarks if the store has none yet.
    ///
    /// Returns `true` when the store was initialised by this call.
    pub fn initialize_local_database(&self, ctx: &RelayerContext) -> Result<bool> {
        let store = ctx.store();
        if store
            .find_record::<LocalMetadata>(keys::LOCAL_METADATA)?
            .is_some()
        {
            return Ok(false);
        }

        let mut batch = StoreBatch::new();
        batch.put_local_metadata(&LocalMetadata::genesis(ctx.config.shards.clone()))?;
        if store
            .find_record::<ExecutionSummary>(keys::EXECUTION_SUMMARY)?
            .is_none()
        {
            batch.put_execution_summary(&ExecutionSummary::default())?;
        }
        batch.commit(store)?;

        tracing::info!(shards = ?ctx.config.shards, "initialised local database at genesis");
        Ok(true)
    }

    /// Refreshes the committee metadata of every owned shard.
    ///
    /// A missing or zero threshold is treated as 1 and a threshold larger
    /// than the committee is clamped to its size. Shards where this node
    /// is not a committee member are skipped.
    pub fn fetch_shard_info(&self, ctx: &RelayerContext) -> Result<()> {
        let store = ctx.store();
        let meta = store.local_metadata()?;
        let mut batch = StoreBatch::new();

        for &shard in &meta.shard_id {
            let members = ctx.chain.shard_members(shard)?;
            let Some(beacon_index) = ctx.chain.beacon_index(shard, ctx.identity.account())? else {
                tracing::warn!(shard, account = ctx.identity.account(), "not a committee member");
                continue;
            };
            let size = u32::try_from(members.len()).unwrap_or(u32::MAX);
            let threshold = ctx
                .chain
                .confirmation_threshold(shard)?
                .unwrap_or(0)
                .max(1)
                .min(size);

            let shard_key = store
                .find_record::<ShardMetadata>(&keys::shard_metadata(shard))?
                .map(|m| m.shard_key)
                .unwrap_or_default();

            let metadata = ShardMetadata {
                shard_key,
                shard_members: members,
                beacon_index,
                threshold,
            };
            if let Err(e) = metadata.validate() {
                tracing::warn!(shard, error = %e, "ignoring invalid committee metadata");
                continue;
            }

            tracing::debug!(shard, beacon_index, threshold, size, "committee refreshed");
            batch.put_shard_metadata(shard, &metadata)?;
        }

        batch.commit(store)?;
        Ok(())
    }

    /// Indexes blocks from the watermark (or `from`) up to the head.
    ///
    /// `from` can only move the walk back; a later start is lowered to
    /// `watermark + 1`.
    /// The head is re-read before every block since it keeps advancing.
    /// On reaching it, the watermark becomes `head - 1`. A block that still
    /// fails after the configured retries ends the pass with
    /// [`RelayerError::TransientFetch`]; everything before it is flushed
    /// and the watermark stays below it.
    pub fn fetch(&mut self, ctx: &RelayerContext, from: Option<BlockNumber>) -> Result<IndexProgress> {
        let meta = ctx.store().local_metadata()?;
        let shards = meta.shard_id;
        let policy = ctx.config.indexer.fetch_retry;
        let flush_every = ctx.config.indexer.flush_every.max(1);

        let resume = meta.high_local_block.saturating_add(1);
        let mut next = from.map_or(resume, |from| from.clamp(1, resume));
        let mut indexed = 0;

        loop {
            let head = match policy.run("fetch head", |_| ctx.chain.block_number()) {
                Ok(head) => head,
                Err(source) => return self.abort_at(ctx, next, source),
            };

            if next >= head {
                let watermark = self.flush(ctx, head.saturating_sub(1))?;
                if indexed > 0 {
                    tracing::info!(head, watermark, indexed, "catch-up reached the head");
                }
                return Ok(IndexProgress { indexed, watermark });
            }

            match policy.run("fetch block", |_| self.collect_block(ctx, &shards, next)) {
                Ok(mut batch) => {
                    self.pending.append(&mut batch);
                    indexed += 1;
                    self.since_flush += 1;
                    ctx.metrics.blocks_indexed.inc();
                    tracing::debug!(block = next, "block imported");

                    if self.since_flush >= flush_every {
                        self.flush(ctx, next)?;
                        tracing::info!(block = next, "buffered writes flushed");
                    }
                    next += 1;
                }
                Err(RelayerError::Chain(source)) => return self.abort_at(ctx, next, source),
                Err(other) => {
                    self.flush(ctx, next.saturating_sub(1))?;
                    return Err(other);
                }
            }
        }
    }

    /// Flushes buffered writes without moving the watermark.
    pub fn write_all(&mut self, ctx: &RelayerContext) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let current = ctx.store().local_metadata()?.high_local_block;
        self.flush(ctx, current)?;
        Ok(())
    }

    fn abort_at<T>(&mut self, ctx: &RelayerContext, block: BlockNumber, source: ChainError) -> Result<T> {
        self.flush(ctx, block.saturating_sub(1))?;
        Err(RelayerError::TransientFetch { block, source })
    }

    /// Commits the pending writes together with `watermark`.
    ///
    /// `LocalMetadata` is read fresh and the watermark never moves down.
    fn flush(&mut self, ctx: &RelayerContext, watermark: BlockNumber) -> Result<BlockNumber> {
        let store = ctx.store();
        let mut meta = store.local_metadata()?;
        let new_watermark = meta.high_local_block.max(watermark);

        if self.pending.is_empty() && new_watermark == meta.high_local_block {
            self.since_flush = 0;
            return Ok(new_watermark);
        }

        meta.high_local_block = new_watermark;
        let mut batch = StoreBatch::new();
        batch.append(&mut self.pending);
        batch.put_local_metadata(&meta)?;
        if let Err(e) = batch.commit(store) {
            // Keep the records for the next attempt.
            self.pending.append(&mut batch);
            return Err(e.into());
        }

        self.since_flush = 0;
        ctx.metrics.index_watermark.set(i64::from(new_watermark));
        Ok(new_watermark)
    }

    /// Fetches every record of `block` across `shards` into a fresh batch.
    fn collect_block(
        &self,
        ctx: &RelayerContext,
        shards: &[ShardId],
        block: BlockNumber,
    ) -> Result<StoreBatch> {
        let mut batch = StoreBatch::new();

        for &shard in shards {
            let calls = ctx.chain.call_history(shard, block)?;
            let mut contracts = Vec::new();

            for &call_index in &calls {
                let remote = ctx.chain.call_record(call_index)?;
                let record = CallRecord {
                    call_index,
                    origin: remote.origin,
                    payload: CallPayload::from_remote(remote.payload),
                };

                if let Some(parsed) = record.payload.as_calls() {
                    let deploys = parsed.ops.iter().filter(|c| {
                        c.action == CallAction::Deploy && c.origin == ctx.config.dispatcher.root_origin
                    });
                    for call in deploys {
                        let blob = ctx
                            .chain
                            .wasm_blob_ref(&call.receiver)?
                            .or_else(|| call.wasm_blob_path.clone());
                        let Some(wasm_blob_path) = blob else {
                            tracing::warn!(shard, block, call_index, contract = %call.receiver, "deployment without code reference");
                            continue;
                        };
                        let contract = Contract {
                            home_shard: shard,
                            wasm_blob_path,
                            deployment_calls: parsed.clone(),
                            deployment_call_index: call_index,
                        };
                        batch.put_contract(&call.receiver, &contract)?;
                        contracts.push(call.receiver.clone());
                    }
                } else {
                    tracing::debug!(shard, block, call_index, "storing opaque call payload");
                }

                batch.put_call_record(shard, &record)?;
            }

            batch.put_block(&Block {
                shard_id: shard,
                block_number: block,
                calls,
                contracts,
            })?;
        }

        Ok(batch)
    }
}
