use super::{ValidationError, Validator, block_range, fatal};
use crate::config::ExecutionRecovery;
use crate::error::{RelayerError, Result};
use crate::orchestrator::RelayerContext;
use crate::storage::{StoreBatch, StoreExt};
use crate::types::{BlockNumber, Codec, ExecutionSummary, ShardId};

impl Validator {
    /// Checks persisted outcomes against the outcomes confirmed remotely.
    ///
    /// Assumes the index was validated first. An execution watermark above
    /// the index watermark is either fatal or reset to the index watermark,
    /// depending on [`ExecutionRecovery`]. Calls without a confirmed remote
    /// outcome are not compared. At the first diverging block `i` the
    /// execution watermark is truncated to `i - 1`, persisted and returned.
    pub fn validate_executor(
        &self,
        ctx: &RelayerContext,
        start: Option<BlockNumber>,
        end: Option<BlockNumber>,
    ) -> Result<BlockNumber> {
        let meta = ctx
            .store()
            .local_metadata()
            .map_err(|e| fatal("reading local metadata", e))?;
        let executed = self.recover_execution_ahead(ctx)?;

        for block in block_range(start, end, executed) {
            for &shard in &meta.shard_id {
                if let Err(e) = check_outcomes(ctx, shard, block) {
                    tracing::warn!(shard, block, error = %e, "executed block diverges from ledger");
                    return truncate_execution(ctx, block - 1);
                }
            }
        }

        tracing::debug!(watermark = executed, "execution validated");
        Ok(executed)
    }
}

impl Validator {
    /// Applies [`ExecutionRecovery`] when the execution watermark is above
    /// the index watermark, and returns the execution watermark.
    pub(super) fn recover_execution_ahead(&self, ctx: &RelayerContext) -> Result<BlockNumber> {
        let store = ctx.store();
        let indexed = store
            .local_metadata()
            .map_err(|e| fatal("reading local metadata", e))?
            .high_local_block;
        let executed = store
            .execution_summary()
            .map_err(|e| fatal("reading execution summary", e))?
            .high_local_execution_block;

        if executed <= indexed {
            return Ok(executed);
        }
        match ctx.config.orchestrator.execution_recovery {
            ExecutionRecovery::Abort => Err(RelayerError::Fatal(format!(
                "execution watermark {executed} is ahead of index watermark {indexed}"
            ))),
            ExecutionRecovery::Reset => {
                tracing::warn!(executed, indexed, "execution watermark ahead of index, resetting");
                truncate_execution(ctx, indexed)
            }
        }
    }
}

/// Pulls the execution watermark down to `index` after the index was
/// rolled back below it.
pub(super) fn clamp_execution(ctx: &RelayerContext, index: BlockNumber) -> Result<BlockNumber> {
    let executed = ctx
        .store()
        .execution_summary()
        .map_err(|e| fatal("reading execution summary", e))?
        .high_local_execution_block;
    if executed > index {
        return truncate_execution(ctx, index);
    }
    Ok(executed)
}

fn check_outcomes(
    ctx: &RelayerContext,
    shard: ShardId,
    block: BlockNumber,
) -> Result<(), ValidationError> {
    let store = ctx.store();
    store.block_summary(shard, block)?;
    let record = store.block(shard, block)?;

    for &call_index in &record.calls {
        let Some(confirmed) = ctx.chain.confirmed_outcome(shard, call_index)? else {
            continue;
        };
        if store.outcomes(shard, call_index)?.encode()? != confirmed {
            return Err(ValidationError::Mismatch(format!("outcome of call {call_index}")));
        }
    }
    Ok(())
}

fn truncate_execution(ctx: &RelayerContext, to: BlockNumber) -> Result<BlockNumber> {
    let mut batch = StoreBatch::new();
    batch.put_execution_summary(&ExecutionSummary {
        high_local_execution_block: to,
    })?;
    batch.commit(ctx.store())?;

    ctx.metrics.execution_watermark.set(i64::from(to));
    tracing::warn!(watermark = to, "execution watermark rolled back");
    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_client::RemoteCall;
    use crate::config::RelayerConfig;
    use crate::dispatcher::Dispatcher;
    use crate::indexer::Indexer;
    use crate::testing::{MockChain, MockEngine, context, context_with, genesis};
    use crate::types::{Call, CallAction, Calls, Outcomes};
    use std::sync::Arc;

    /// One call per block in blocks 1 to 4, indexed and executed, with
    /// every outcome confirmed remotely.
    fn executed_with(config: RelayerConfig) -> (Arc<MockChain>, RelayerContext) {
        let chain = MockChain::new(5);
        for block in 1..=4 {
            let calls = Calls::new(
                0,
                Some(block),
                vec![Call::new("alice", CallAction::ViewCall, "counter").with_method("get", Vec::new())],
            );
            chain.post_calls(block, block, &calls);
        }
        let ctx = context_with(chain.clone(), MockEngine::new(), config);
        genesis(&ctx);
        Indexer::new().fetch(&ctx, None).unwrap();
        Dispatcher::new().dispatch(&ctx).unwrap();
        for idx in 1..=4 {
            let local = ctx.store().outcomes(0, idx).unwrap().encode().unwrap();
            chain.outcomes.lock().unwrap().insert((0, idx), local);
        }
        (chain, ctx)
    }

    fn set_execution(ctx: &RelayerContext, block: BlockNumber) {
        let mut batch = StoreBatch::new();
        batch
            .put_execution_summary(&ExecutionSummary {
                high_local_execution_block: block,
            })
            .unwrap();
        batch.commit(ctx.store()).unwrap();
    }

    #[test]
    fn confirmed_outcomes_keep_the_watermark() {
        let (_, ctx) = executed_with(RelayerConfig::default());
        assert_eq!(Validator::new().validate_executor(&ctx, None, None).unwrap(), 4);
    }

    #[test]
    fn unconfirmed_calls_are_not_compared() {
        let (chain, ctx) = executed_with(RelayerConfig::default());
        chain.outcomes.lock().unwrap().clear();
        assert_eq!(Validator::new().validate_executor(&ctx, None, None).unwrap(), 4);
    }

    #[test]
    fn diverging_outcome_makes_block_dispatchable_again() {
        let (chain, ctx) = executed_with(RelayerConfig::default());
        chain
            .outcomes
            .lock()
            .unwrap()
            .insert((0, 3), Outcomes::default().encode().unwrap());

        assert_eq!(Validator::new().validate_executor(&ctx, None, None).unwrap(), 2);
        assert_eq!(ctx.store().execution_summary().unwrap().high_local_execution_block, 2);
        assert!(Dispatcher::new().is_dispatchable(&ctx, 3).unwrap());
    }

    #[test]
    fn execution_ahead_of_index_aborts_by_default() {
        let (_, ctx) = executed_with(RelayerConfig::default());
        set_execution(&ctx, 9);
        let err = Validator::new().validate_executor(&ctx, None, None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn execution_ahead_of_index_can_be_reset() {
        let mut config = RelayerConfig::default();
        config.orchestrator.execution_recovery = ExecutionRecovery::Reset;
        let (_, ctx) = executed_with(config);
        set_execution(&ctx, 9);

        assert_eq!(Validator::new().validate_executor(&ctx, None, None).unwrap(), 4);
        assert_eq!(ctx.store().execution_summary().unwrap().high_local_execution_block, 4);
    }

    #[test]
    fn index_rollback_below_executed_blocks_is_recovered() {
        let (chain, ctx) = executed_with(RelayerConfig::default());
        let diverged = Calls::new(
            0,
            Some(3),
            vec![Call::new("alice", CallAction::ViewCall, "counter").with_method("peek", Vec::new())],
        );
        chain.records.lock().unwrap().insert(
            3,
            RemoteCall {
                origin: "alice".into(),
                payload: diverged.encode().unwrap(),
            },
        );

        let marks = Validator::new().validate_all(&ctx).unwrap();
        assert_eq!(marks.index, 2);
        assert_eq!(marks.execution, 2);
        assert_eq!(ctx.store().local_metadata().unwrap().high_local_block, 2);
        assert_eq!(ctx.store().execution_summary().unwrap().high_local_execution_block, 2);
    }

    #[test]
    fn execution_ahead_before_validation_still_aborts() {
        let (_, ctx) = executed_with(RelayerConfig::default());
        set_execution(&ctx, 9);
        assert!(Validator::new().validate_all(&ctx).unwrap_err().is_fatal());
    }

    #[test]
    fn validate_all_runs_index_then_execution() {
        let (_, ctx) = executed_with(RelayerConfig::default());
        let marks = Validator::new().validate_all(&ctx).unwrap();
        assert_eq!(marks.index, 4);
        assert_eq!(marks.execution, 4);

        let empty = context(MockChain::new(1), MockEngine::new());
        assert!(Validator::new().validate_all(&empty).unwrap_err().is_fatal());
    }
}
