//! Shard manager: committee registration, outcome reports and batching.
//!
//! The manager turns local execution results into ledger transactions.
//! Transactions are never sent one by one; they are queued in a
//! [`TxBuffer`] and flushed as a single batch once the buffer is large or
//! old enough.

pub mod beacon;
pub mod buffer;

use crate::chain_client::ChainTx;
use crate::error::Result;
use crate::orchestrator::RelayerContext;
use crate::storage::{StoreBatch, StoreExt, keys};
use crate::types::{Block, BlockNumber, Codec, Outcomes, Shard, ShardId, ShardMetadata};

pub use beacon::beacon_is_turn;
pub use buffer::{QueuedTransaction, TxBuffer};

/// Result of one submitter iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmitProgress {
    pub queued: usize,
    pub submitted: bool,
}

#[derive(Debug, Default)]
pub struct ShardManager {
    /// Next block to build reports for. Loaded from the per-shard sync
    /// bookkeeping on first use.
    report_cursor: Option<BlockNumber>,
}

impl ShardManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration transactions when this node's committee membership is
    /// missing or expires within the configured margin of `block`.
    pub fn maybe_register_secret_keeper(
        &self,
        ctx: &RelayerContext,
        block: BlockNumber,
    ) -> Result<Option<Vec<ChainTx>>> {
        let identity = &ctx.identity;
        let expiration = ctx.chain.registration_expiration(identity.account())?;
        let margin = ctx.config.shard.registration_margin;

        let registration = match expiration {
            None => ChainTx::RegisterSecretKeeper {
                public_key: *identity.public_key(),
                attestation: identity.attestation().to_vec(),
            },
            Some(expires) if expires <= block.saturating_add(margin) => {
                ChainTx::RenewRegistration {
                    public_key: *identity.public_key(),
                    attestation: identity.attestation().to_vec(),
                }
            }
            Some(_) => return Ok(None),
        };

        tracing::info!(block, ?expiration, tx = registration.method(), "registration due");
        let mut txs = vec![registration];
        txs.extend(
            owned_shards(ctx)?
                .into_iter()
                .map(|shard_id| ChainTx::RegisterRunningShard { shard_id }),
        );
        Ok(Some(txs))
    }

    /// Outcome reports for `block`, one per shard where this node is on-turn.
    ///
    /// Empty blocks are not reported. Blocks whose confirmation count
    /// already reaches the shard threshold are skipped and recorded as
    /// confirmed. Nothing is submitted here.
    pub fn maybe_submit_execution_report(
        &self,
        ctx: &RelayerContext,
        block: BlockNumber,
    ) -> Result<Vec<ChainTx>> {
        let store = ctx.store();
        let mut bookkeeping = StoreBatch::new();
        let mut txs = Vec::new();

        for shard in owned_shards(ctx)? {
            let Some(committee) =
                store.find_record::<ShardMetadata>(&keys::shard_metadata(shard))?
            else {
                continue;
            };
            if !beacon_is_turn(block, &committee) {
                continue;
            }
            let Some(record) = store.find_record::<Block>(&keys::block(shard, block))? else {
                continue;
            };
            if record.calls.is_empty() {
                continue;
            }

            let confirmations = ctx.chain.confirmation(shard, block)?;
            if confirmations >= committee.threshold {
                tracing::debug!(shard, block, confirmations, "block already confirmed");
                let mut progress = self.shard_progress(ctx, shard)?;
                if progress.high_remote_confirmed_block_index < block {
                    progress.high_remote_confirmed_block_index = block;
                    bookkeeping.put_shard(shard, &progress)?;
                }
                continue;
            }

            let summary = store.block_summary(shard, block)?;
            let mut outcomes = Vec::with_capacity(record.calls.len());
            for &call_index in &record.calls {
                let outcome = match store.find_record::<Outcomes>(&keys::outcomes(shard, call_index))? {
                    Some(outcome) => outcome,
                    None => {
                        tracing::warn!(shard, block, call_index, "no outcome recorded, reporting empty");
                        Outcomes {
                            ops: Vec::new(),
                            state_root: summary.state_root,
                        }
                    }
                };
                outcomes.push(outcome.encode()?);
            }

            txs.push(ChainTx::SubmitOutcome {
                block_number: block,
                shard_id: shard,
                state_root: summary.state_root,
                call_indexes: record.calls,
                outcomes,
            });
        }

        if !bookkeeping.is_empty() {
            bookkeeping.commit(store)?;
        }
        Ok(txs)
    }

    /// Submits the buffer as one batch when it holds at least `batch_size`
    /// transactions or its oldest entry is `batch_lag` blocks behind
    /// `current`. Returns whether a batch went out.
    pub fn maybe_submit_tx_batch(
        &self,
        ctx: &RelayerContext,
        buffer: &mut TxBuffer,
        current: Option<BlockNumber>,
    ) -> Result<bool> {
        if buffer.is_empty() {
            return Ok(false);
        }
        let cfg = &ctx.config.shard;
        let full = buffer.len() >= cfg.batch_size;
        let stale = match (buffer.oldest_block(), current) {
            (Some(oldest), Some(current)) => oldest.saturating_add(cfg.batch_lag) <= current,
            _ => false,
        };
        if !full && !stale {
            return Ok(false);
        }
        self.submit_buffer(ctx, buffer)
    }

    /// Submits whatever is queued, regardless of size or age.
    pub fn flush(&self, ctx: &RelayerContext, buffer: &mut TxBuffer) -> Result<bool> {
        if buffer.is_empty() {
            return Ok(false);
        }
        self.submit_buffer(ctx, buffer)
    }

    fn submit_buffer(&self, ctx: &RelayerContext, buffer: &mut TxBuffer) -> Result<bool> {
        let txs = buffer.transactions();
        let count = txs.len();

        match ctx.chain.submit(ChainTx::batch(txs)) {
            Ok(()) => {
                let reported = buffer.reported_blocks();
                buffer.reset();
                ctx.metrics.batches_submitted.inc();
                tracing::info!(transactions = count, "batch submitted");
                self.mark_synced(ctx, &reported)?;
                Ok(true)
            }
            Err(e) => {
                let attempts = buffer.record_failure();
                if attempts >= ctx.config.shard.max_submit_attempts {
                    tracing::error!(transactions = count, attempts, error = %e, "dropping batch");
                    ctx.metrics.submissions_failed.inc();
                    buffer.reset();
                } else {
                    tracing::warn!(transactions = count, attempts, error = %e, "batch submission failed");
                }
                Ok(false)
            }
        }
    }

    fn shard_progress(&self, ctx: &RelayerContext, shard: ShardId) -> Result<Shard> {
        Ok(ctx
            .store()
            .find_record::<Shard>(&keys::shard(shard))?
            .unwrap_or_default())
    }

    fn mark_synced(&self, ctx: &RelayerContext, reported: &[(ShardId, BlockNumber)]) -> Result<()> {
        let mut batch = StoreBatch::new();
        for &(shard, block) in reported {
            let mut progress = self.shard_progress(ctx, shard)?;
            if progress.high_remote_synced_block_index < block {
                progress.high_remote_synced_block_index = block;
                batch.put_shard(shard, &progress)?;
            }
        }
        batch.commit(ctx.store())?;
        Ok(())
    }

    /// One submitter iteration: queue registration and outcome reports for
    /// newly executed blocks, then submit the buffer if it is due.
    pub fn tick(&mut self, ctx: &RelayerContext, buffer: &mut TxBuffer) -> Result<SubmitProgress> {
        let head = ctx.chain.block_number()?;
        let mut progress = SubmitProgress::default();

        let registering = buffer.contains(|tx| {
            matches!(
                tx,
                ChainTx::RegisterSecretKeeper { .. } | ChainTx::RenewRegistration { .. }
            )
        });
        if !registering {
            if let Some(txs) = self.maybe_register_secret_keeper(ctx, head)? {
                progress.queued += txs.len();
                for tx in txs {
                    buffer.push(head, tx);
                }
            }
        }

        let executed = ctx.store().execution_summary()?.high_local_execution_block;
        let mut cursor = match self.report_cursor {
            Some(cursor) => cursor,
            None => self.first_unsynced_block(ctx)?,
        };
        while cursor <= executed {
            let txs = self.maybe_submit_execution_report(ctx, cursor)?;
            progress.queued += txs.len();
            for tx in txs {
                buffer.push(cursor, tx);
            }
            cursor += 1;
            self.report_cursor = Some(cursor);
        }

        ctx.metrics.transactions_queued.inc_by(progress.queued as u64);
        progress.submitted = self.maybe_submit_tx_batch(ctx, buffer, Some(head))?;
        Ok(progress)
    }

    fn first_unsynced_block(&self, ctx: &RelayerContext) -> Result<BlockNumber> {
        let mut lowest: Option<BlockNumber> = None;
        for shard in owned_shards(ctx)? {
            let synced = self.shard_progress(ctx, shard)?.high_remote_synced_block_index;
            lowest = Some(lowest.map_or(synced, |l| l.min(synced)));
        }
        Ok(lowest.unwrap_or(0).saturating_add(1))
    }
}

/// Shards this node runs, as persisted at genesis.
fn owned_shards(ctx: &RelayerContext) -> Result<Vec<ShardId>> {
    Ok(ctx.store().local_metadata()?.shard_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::indexer::Indexer;
    use crate::testing::{MockChain, MockEngine, context, context_with, genesis};
    use crate::config::RelayerConfig;
    use crate::types::{Call, CallAction, Calls, LocalMetadata};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn post(chain: &MockChain, block: BlockNumber, idx: u32) {
        let calls = Calls::new(
            0,
            Some(block),
            vec![Call::new("alice", CallAction::FunctionCall, "counter").with_method("inc", Vec::new())],
        );
        chain.post_calls(block, idx, &calls);
    }

    /// Chain with calls in blocks 1 and 3, fully indexed and executed, and
    /// this node the only committee member.
    fn executed(chain: Arc<MockChain>) -> RelayerContext {
        post(&chain, 1, 1);
        post(&chain, 1, 2);
        post(&chain, 3, 3);
        let ctx = context(chain.clone(), MockEngine::new());
        chain.set_committee(0, &[ctx.identity.account()], 1);
        genesis(&ctx);
        let mut indexer = Indexer::new();
        indexer.fetch_shard_info(&ctx).unwrap();
        indexer.fetch(&ctx, None).unwrap();
        Dispatcher::new().dispatch(&ctx).unwrap();
        ctx
    }

    #[test]
    fn registers_when_expiration_is_unset() {
        let ctx = context(MockChain::new(1), MockEngine::new());
        genesis(&ctx);
        let txs = ShardManager::new()
            .maybe_register_secret_keeper(&ctx, 100)
            .unwrap()
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert!(matches!(txs[0], ChainTx::RegisterSecretKeeper { .. }));
        assert_eq!(txs[1], ChainTx::RegisterRunningShard { shard_id: 0 });
    }

    #[test]
    fn renews_only_within_margin() {
        let chain = MockChain::new(1);
        let ctx = context(chain.clone(), MockEngine::new());
        genesis(&ctx);
        let manager = ShardManager::new();

        *chain.expiration.lock().unwrap() = Some(200);
        assert_eq!(manager.maybe_register_secret_keeper(&ctx, 189).unwrap(), None);

        let txs = manager.maybe_register_secret_keeper(&ctx, 190).unwrap().unwrap();
        assert!(matches!(
            &txs[0],
            ChainTx::RenewRegistration { public_key, .. } if public_key == ctx.identity.public_key()
        ));
    }

    #[test]
    fn owned_shards_come_from_persisted_metadata() {
        let mut config = RelayerConfig::default();
        config.shards = vec![0, 1];
        let ctx = context_with(MockChain::new(1), MockEngine::new(), config);
        let mut batch = StoreBatch::new();
        batch.put_local_metadata(&LocalMetadata::genesis(vec![2])).unwrap();
        batch
            .put_shard(
                2,
                &Shard {
                    high_remote_synced_block_index: 6,
                    high_remote_confirmed_block_index: 0,
                },
            )
            .unwrap();
        batch.commit(ctx.store()).unwrap();

        let manager = ShardManager::new();
        let txs = manager.maybe_register_secret_keeper(&ctx, 1).unwrap().unwrap();
        assert_eq!(&txs[1..], &[ChainTx::RegisterRunningShard { shard_id: 2 }]);
        assert_eq!(manager.first_unsynced_block(&ctx).unwrap(), 7);
    }

    #[test]
    fn reports_on_turn_blocks_with_calls() {
        let ctx = executed(MockChain::new(4));
        let manager = ShardManager::new();

        let txs = manager.maybe_submit_execution_report(&ctx, 1).unwrap();
        assert_eq!(txs.len(), 1);
        let ChainTx::SubmitOutcome {
            block_number,
            shard_id,
            state_root,
            call_indexes,
            outcomes,
        } = &txs[0]
        else {
            panic!("expected an outcome report");
        };
        assert_eq!((*block_number, *shard_id), (1, 0));
        assert_eq!(*state_root, ctx.store().block_summary(0, 1).unwrap().state_root);
        assert_eq!(call_indexes, &vec![1, 2]);
        assert_eq!(outcomes[0], ctx.store().outcomes(0, 1).unwrap().encode().unwrap());

        assert!(manager.maybe_submit_execution_report(&ctx, 2).unwrap().is_empty());
    }

    #[test]
    fn off_turn_and_confirmed_blocks_are_skipped() {
        let chain = MockChain::new(4);
        let ctx = executed(chain.clone());
        let manager = ShardManager::new();

        // Two members, threshold one: this node (index 0) reports even blocks.
        let mut committee = ctx.store().shard_metadata(0).unwrap();
        committee.shard_members.push("peer".into());
        let mut batch = StoreBatch::new();
        batch.put_shard_metadata(0, &committee).unwrap();
        batch.commit(ctx.store()).unwrap();
        assert!(manager.maybe_submit_execution_report(&ctx, 1).unwrap().is_empty());
        assert!(manager.maybe_submit_execution_report(&ctx, 3).unwrap().is_empty());

        committee.shard_members.pop();
        let mut batch = StoreBatch::new();
        batch.put_shard_metadata(0, &committee).unwrap();
        batch.commit(ctx.store()).unwrap();
        chain.confirmations.lock().unwrap().insert((0, 3), 1);
        assert!(manager.maybe_submit_execution_report(&ctx, 3).unwrap().is_empty());
        assert_eq!(ctx.store().shard(0).unwrap().high_remote_confirmed_block_index, 3);
    }

    #[test]
    fn batch_waits_for_size_or_age() {
        let chain = MockChain::new(1);
        let mut config = RelayerConfig::default();
        config.shard.batch_size = 3;
        config.shard.batch_lag = 2;
        let ctx = context_with(chain.clone(), MockEngine::new(), config);
        let manager = ShardManager::new();
        let mut buffer = TxBuffer::new();

        assert!(!manager.maybe_submit_tx_batch(&ctx, &mut buffer, Some(50)).unwrap());

        buffer.push(10, ChainTx::RegisterRunningShard { shard_id: 0 });
        buffer.push(11, ChainTx::RegisterRunningShard { shard_id: 1 });
        assert!(!manager.maybe_submit_tx_batch(&ctx, &mut buffer, Some(11)).unwrap());
        assert!(!manager.maybe_submit_tx_batch(&ctx, &mut buffer, None).unwrap());
        assert!(manager.maybe_submit_tx_batch(&ctx, &mut buffer, Some(12)).unwrap());
        assert_eq!(
            chain.submitted(),
            vec![ChainTx::Batch(vec![
                ChainTx::RegisterRunningShard { shard_id: 0 },
                ChainTx::RegisterRunningShard { shard_id: 1 },
            ])]
        );
        assert_eq!(buffer.entries(), &[QueuedTransaction::sentinel()]);

        for shard_id in 0..3 {
            buffer.push(20, ChainTx::RegisterRunningShard { shard_id });
        }
        assert!(manager.maybe_submit_tx_batch(&ctx, &mut buffer, Some(20)).unwrap());
        assert_eq!(chain.submitted().len(), 2);
    }

    #[test]
    fn failed_submission_is_retried_then_dropped() {
        let chain = MockChain::new(1);
        let ctx = context(chain.clone(), MockEngine::new());
        let manager = ShardManager::new();
        let mut buffer = TxBuffer::new();
        buffer.push(1, ChainTx::RegisterRunningShard { shard_id: 0 });

        chain.failing_submits.store(1, Ordering::SeqCst);
        assert!(!manager.flush(&ctx, &mut buffer).unwrap());
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.failed_attempts(), 1);
        assert!(manager.flush(&ctx, &mut buffer).unwrap());
        assert!(buffer.is_empty());

        buffer.push(2, ChainTx::RegisterRunningShard { shard_id: 0 });
        chain.failing_submits.store(10, Ordering::SeqCst);
        for _ in 0..ctx.config.shard.max_submit_attempts {
            assert!(!manager.flush(&ctx, &mut buffer).unwrap());
        }
        assert!(buffer.is_empty());
        assert_eq!(ctx.metrics.submissions_failed.get(), 1);
    }

    #[test]
    fn tick_reports_each_executed_block_once_and_tracks_sync() {
        let chain = MockChain::new(4);
        let ctx = executed(chain.clone());
        *chain.expiration.lock().unwrap() = Some(1_000);
        let mut manager = ShardManager::new();
        let mut buffer = TxBuffer::new();

        let progress = manager.tick(&ctx, &mut buffer).unwrap();
        assert_eq!(progress.queued, 2);
        assert!(progress.submitted);
        assert_eq!(ctx.store().shard(0).unwrap().high_remote_synced_block_index, 3);

        let progress = manager.tick(&ctx, &mut buffer).unwrap();
        assert_eq!(progress, SubmitProgress::default());
        assert_eq!(chain.submitted().len(), 1);

        // A restarted manager resumes after the synced block.
        let mut restarted = ShardManager::new();
        assert_eq!(restarted.tick(&ctx, &mut buffer).unwrap().queued, 0);
    }

    #[test]
    fn registration_is_not_queued_twice() {
        let chain = MockChain::new(1);
        let mut config = RelayerConfig::default();
        config.shard.batch_lag = 100;
        let ctx = context_with(chain.clone(), MockEngine::new(), config);
        genesis(&ctx);
        let mut manager = ShardManager::new();
        let mut buffer = TxBuffer::new();

        assert_eq!(manager.tick(&ctx, &mut buffer).unwrap().queued, 2);
        assert_eq!(manager.tick(&ctx, &mut buffer).unwrap().queued, 0);
        assert_eq!(buffer.len(), 2);
        assert!(chain.submitted().is_empty());
    }
}
