use super::{ValidationError, Validator, block_range, fatal};
use crate::error::Result;
use crate::orchestrator::RelayerContext;
use crate::storage::{StoreBatch, StoreExt};
use crate::types::{BlockNumber, ShardId};

impl Validator {
    /// Checks indexed blocks against the remote call history.
    ///
    /// Walks `start` (default 1) to `end` (default the index watermark).
    /// Blocks with recorded calls must match the remote call-index list in
    /// length and index sum, and every call record must match the remote
    /// payload and origin byte for byte. At the first block `i` that
    /// diverges or cannot be read, the index watermark is truncated to
    /// `i - 1`, persisted and returned. Unreadable local metadata is fatal.
    pub fn validate_indexer(
        &self,
        ctx: &RelayerContext,
        start: Option<BlockNumber>,
        end: Option<BlockNumber>,
    ) -> Result<BlockNumber> {
        let meta = ctx
            .store()
            .local_metadata()
            .map_err(|e| fatal("reading local metadata", e))?;

        for block in block_range(start, end, meta.high_local_block) {
            for &shard in &meta.shard_id {
                if let Err(e) = check_block(ctx, shard, block) {
                    tracing::warn!(shard, block, error = %e, "indexed block diverges from ledger");
                    return truncate_index(ctx, block - 1);
                }
            }
        }

        tracing::debug!(watermark = meta.high_local_block, "index validated");
        Ok(meta.high_local_block)
    }
}

fn check_block(
    ctx: &RelayerContext,
    shard: ShardId,
    block: BlockNumber,
) -> Result<(), ValidationError> {
    let store = ctx.store();
    let local = store.block(shard, block)?;
    if local.calls.is_empty() {
        return Ok(());
    }

    let remote = ctx.chain.call_history(shard, block)?;
    let remote_sum: u64 = remote.iter().map(|&i| u64::from(i)).sum();
    if local.calls.len() != remote.len() || local.call_index_sum() != remote_sum {
        return Err(ValidationError::Mismatch(format!(
            "{} local calls (sum {}) vs {} remote calls (sum {remote_sum})",
            local.calls.len(),
            local.call_index_sum(),
            remote.len()
        )));
    }

    for &call_index in &local.calls {
        let record = store.call_record(shard, call_index)?;
        let remote = ctx.chain.call_record(call_index)?;
        if record.payload.to_wire()? != remote.payload {
            return Err(ValidationError::Mismatch(format!("payload of call {call_index}")));
        }
        if record.origin != remote.origin {
            return Err(ValidationError::Mismatch(format!("origin of call {call_index}")));
        }
    }
    Ok(())
}

fn truncate_index(ctx: &RelayerContext, to: BlockNumber) -> Result<BlockNumber> {
    let store = ctx.store();
    let mut meta = store.local_metadata()?;
    meta.high_local_block = meta.high_local_block.min(to);

    let mut batch = StoreBatch::new();
    batch.put_local_metadata(&meta)?;
    batch.commit(store)?;

    ctx.metrics.index_watermark.set(i64::from(meta.high_local_block));
    tracing::warn!(watermark = meta.high_local_block, "index watermark rolled back");
    Ok(meta.high_local_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_client::RemoteCall;
    use crate::error::RelayerError;
    use crate::indexer::Indexer;
    use crate::testing::{MockChain, MockEngine, context, genesis};
    use crate::types::{Call, CallAction, Calls, Codec};
    use std::sync::Arc;

    fn calls(block: BlockNumber, method: &str) -> Calls {
        Calls::new(
            0,
            Some(block),
            vec![Call::new("alice", CallAction::FunctionCall, "counter").with_method(method, Vec::new())],
        )
    }

    /// One call per block in blocks 1 to 4, all indexed.
    fn indexed() -> (Arc<MockChain>, RelayerContext) {
        let chain = MockChain::new(5);
        for block in 1..=4 {
            chain.post_calls(block, block * 10, &calls(block, "inc"));
        }
        let ctx = context(chain.clone(), MockEngine::new());
        genesis(&ctx);
        Indexer::new().fetch(&ctx, None).unwrap();
        assert_eq!(ctx.store().local_metadata().unwrap().high_local_block, 4);
        (chain, ctx)
    }

    #[test]
    fn consistent_index_is_kept() {
        let (_, ctx) = indexed();
        assert_eq!(Validator::new().validate_indexer(&ctx, None, None).unwrap(), 4);
    }

    #[test]
    fn diverging_payload_truncates_before_it() {
        let (chain, ctx) = indexed();
        chain.records.lock().unwrap().insert(
            30,
            RemoteCall {
                origin: "alice".into(),
                payload: calls(3, "dec").encode().unwrap(),
            },
        );

        assert_eq!(Validator::new().validate_indexer(&ctx, None, None).unwrap(), 2);
        assert_eq!(ctx.store().local_metadata().unwrap().high_local_block, 2);
    }

    #[test]
    fn diverging_call_history_truncates_before_it() {
        let (chain, ctx) = indexed();
        chain.history.lock().unwrap().insert((0, 2), vec![21]);
        assert_eq!(Validator::new().validate_indexer(&ctx, None, None).unwrap(), 1);
    }

    #[test]
    fn diverging_origin_is_detected() {
        let (chain, ctx) = indexed();
        chain.records.lock().unwrap().get_mut(&40).unwrap().origin = "mallory".into();
        assert_eq!(Validator::new().validate_indexer(&ctx, None, None).unwrap(), 3);
    }

    #[test]
    fn remote_fault_counts_as_divergence() {
        let (chain, ctx) = indexed();
        *chain.failing_block.lock().unwrap() = Some(2);
        assert_eq!(Validator::new().validate_indexer(&ctx, None, None).unwrap(), 1);
    }

    #[test]
    fn range_limits_what_is_checked() {
        let (chain, ctx) = indexed();
        *chain.failing_block.lock().unwrap() = Some(2);
        assert_eq!(Validator::new().validate_indexer(&ctx, Some(3), Some(4)).unwrap(), 4);
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let ctx = context(MockChain::new(1), MockEngine::new());
        let err = Validator::new().validate_indexer(&ctx, None, None).unwrap_err();
        assert!(matches!(err, RelayerError::Fatal(_)));
    }
}
