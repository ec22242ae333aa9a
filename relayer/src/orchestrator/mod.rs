//! Pipeline orchestration: startup, the cooperative loop and shutdown.
//!
//! A [`Pipeline`] owns the per-process state of the indexer, dispatcher
//! and submitter. [`run`] drives it: every tick runs the stages of the
//! configured [`Role`] on the blocking pool, sleeps one block interval
//! when nothing progressed, and on shutdown flushes buffered writes and
//! queued transactions before returning.

pub mod context;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::dispatcher::Dispatcher;
use crate::error::{RelayerError, Result};
use crate::indexer::Indexer;
use crate::shard::{ShardManager, TxBuffer};
use crate::storage::StoreExt;
use crate::validation::Validator;

pub use context::RelayerContext;

/// Which stages a process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Indexer,
    Dispatcher,
    Submitter,
    All,
}

impl Role {
    pub fn indexes(self) -> bool {
        matches!(self, Role::Indexer | Role::All)
    }

    pub fn executes(self) -> bool {
        matches!(self, Role::Dispatcher | Role::All)
    }

    pub fn submits(self) -> bool {
        matches!(self, Role::Submitter | Role::All)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Indexer => "indexer",
            Role::Dispatcher => "dispatcher",
            Role::Submitter => "submitter",
            Role::All => "all",
        })
    }
}

pub struct Pipeline {
    ctx: Arc<RelayerContext>,
    role: Role,
    indexer: Indexer,
    dispatcher: Dispatcher,
    shards: ShardManager,
    buffer: TxBuffer,
}

impl Pipeline {
    pub fn new(ctx: Arc<RelayerContext>, role: Role) -> Self {
        Self {
            ctx,
            role,
            indexer: Indexer::new(),
            dispatcher: Dispatcher::new(),
            shards: ShardManager::new(),
            buffer: TxBuffer::new(),
        }
    }

    pub fn context(&self) -> &Arc<RelayerContext> {
        &self.ctx
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn buffer(&self) -> &TxBuffer {
        &self.buffer
    }

    /// Genesis, committee refresh and, if configured, validation.
    ///
    /// Only [`RelayerError::Fatal`] and local storage failures are
    /// returned; a failed committee refresh is logged and retried on the
    /// next start.
    pub fn startup(&mut self) -> Result<()> {
        let ctx = self.ctx.as_ref();
        self.indexer.initialize_local_database(ctx)?;

        if self.role.indexes() || self.role.submits() {
            if let Err(e) = self.indexer.fetch_shard_info(ctx) {
                tracing::warn!(error = %e, "committee refresh failed");
            }
        }

        if ctx.config.orchestrator.validate_on_start {
            Validator::new().validate_all(ctx)?;
        }

        let store = ctx.store();
        let indexed = store.local_metadata()?.high_local_block;
        let executed = store.execution_summary()?.high_local_execution_block;
        ctx.metrics.index_watermark.set(i64::from(indexed));
        ctx.metrics.execution_watermark.set(i64::from(executed));
        tracing::info!(role = %self.role, indexed, executed, "pipeline ready");
        Ok(())
    }

    /// Runs every stage of the role once. Returns whether any made progress.
    ///
    /// A failing stage is logged and does not stop the others; only fatal
    /// errors are returned.
    pub fn tick(&mut self) -> Result<bool> {
        let ctx = self.ctx.as_ref();
        let mut progressed = false;

        if self.role.indexes() {
            if let Some(progress) = contain("indexer", self.indexer.fetch(ctx, None))? {
                progressed |= progress.indexed > 0;
            }
        }
        if self.role.executes() {
            if let Some(executed) = contain("dispatcher", self.dispatcher.dispatch(ctx))? {
                progressed |= executed > 0;
            }
        }
        if self.role.submits() {
            if let Some(progress) = contain("submitter", self.shards.tick(ctx, &mut self.buffer))? {
                progressed |= progress.queued > 0 || progress.submitted;
            }
        }
        Ok(progressed)
    }

    /// Flushes pending index writes and queued transactions.
    pub fn shutdown(&mut self) -> Result<()> {
        let ctx = self.ctx.as_ref();
        if self.role.indexes() {
            self.indexer.write_all(ctx)?;
        }
        if self.role.submits() {
            self.shards.flush(ctx, &mut self.buffer)?;
        }
        tracing::info!(role = %self.role, "pipeline stopped");
        Ok(())
    }
}

fn contain<T>(stage: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(stage, error = %e, "stage failed, retrying next tick");
            Ok(None)
        }
    }
}

/// Runs `op` on the blocking pool and hands the pipeline back.
async fn on_blocking<T, F>(mut pipeline: Pipeline, op: F) -> Result<(Pipeline, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut Pipeline) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let result = op(&mut pipeline);
        (pipeline, result)
    })
    .await
    .map_err(|e| RelayerError::Fatal(format!("pipeline task failed: {e}")))
}

/// Drives `pipeline` until `shutdown` turns true or its sender is dropped.
///
/// The flag is checked before every tick; a tick in progress always runs
/// to completion. Returns the first fatal error.
pub async fn run(pipeline: Pipeline, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let (mut pipeline, started) = on_blocking(pipeline, Pipeline::startup).await?;
    started?;

    let interval = pipeline.ctx.config.orchestrator.block_interval;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let (returned, ticked) = on_blocking(pipeline, Pipeline::tick).await?;
        pipeline = returned;
        if ticked? {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("shutdown requested, flushing");
    tokio::task::spawn_blocking(move || {
        let mut pipeline = pipeline;
        pipeline.shutdown()
    })
    .await
    .map_err(|e| RelayerError::Fatal(format!("pipeline task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_client::ChainTx;
    use crate::config::RelayerConfig;
    use crate::storage::StoreBatch;
    use crate::testing::{MockChain, MockEngine, context_with};
    use crate::types::{Call, CallAction, Calls, ExecutionSummary};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn posted_chain() -> Arc<MockChain> {
        let chain = MockChain::new(3);
        let calls = Calls::new(
            0,
            Some(1),
            vec![Call::new("alice", CallAction::FunctionCall, "counter").with_method("inc", Vec::new())],
        );
        chain.post_calls(1, 1, &calls);
        chain
    }

    fn pipeline(chain: Arc<MockChain>, engine: Arc<MockEngine>, role: Role) -> Pipeline {
        let mut config = RelayerConfig::default();
        config.orchestrator.block_interval = Duration::from_millis(10);
        config.shard.batch_lag = 1_000;
        let ctx = context_with(chain.clone(), engine, config);
        chain.set_committee(0, &[ctx.identity.account()], 1);
        *chain.expiration.lock().unwrap() = Some(1_000);
        Pipeline::new(Arc::new(ctx), role)
    }

    #[test]
    fn all_role_runs_every_stage() {
        let chain = posted_chain();
        let mut p = pipeline(chain.clone(), MockEngine::new(), Role::All);
        p.startup().unwrap();

        assert!(p.tick().unwrap());
        let store = p.context().store();
        assert_eq!(store.local_metadata().unwrap().high_local_block, 2);
        assert_eq!(store.execution_summary().unwrap().high_local_execution_block, 2);
        assert_eq!(p.buffer().len(), 1);

        assert!(!p.tick().unwrap());
        p.shutdown().unwrap();
        assert!(matches!(chain.submitted()[0], ChainTx::SubmitOutcome { block_number: 1, .. }));
    }

    #[test]
    fn role_limits_the_stages() {
        let engine = MockEngine::new();
        let mut p = pipeline(posted_chain(), engine.clone(), Role::Indexer);
        p.startup().unwrap();
        p.tick().unwrap();

        let store = p.context().store();
        assert_eq!(store.local_metadata().unwrap().high_local_block, 2);
        assert_eq!(store.execution_summary().unwrap().high_local_execution_block, 0);
        assert_eq!(engine.invocations(), 0);
        assert!(p.buffer().is_empty());
    }

    #[test]
    fn stage_failure_is_contained() {
        let engine = MockEngine::new();
        engine.fail.store(true, Ordering::SeqCst);
        let mut p = pipeline(posted_chain(), engine, Role::All);
        p.startup().unwrap();

        assert!(p.tick().unwrap());
        let store = p.context().store();
        assert_eq!(store.local_metadata().unwrap().high_local_block, 2);
        assert_eq!(store.execution_summary().unwrap().high_local_execution_block, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_stops_on_shutdown_and_flushes() {
        let chain = posted_chain();
        let p = pipeline(chain.clone(), MockEngine::new(), Role::All);
        let ctx = p.context().clone();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run(p, rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(ctx.store().execution_summary().unwrap().high_local_execution_block, 2);
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_fails_on_fatal_startup() {
        let p = pipeline(posted_chain(), MockEngine::new(), Role::All);
        let ctx = p.context().clone();
        Indexer::new().initialize_local_database(&ctx).unwrap();
        let mut batch = StoreBatch::new();
        batch
            .put_execution_summary(&ExecutionSummary {
                high_local_execution_block: 5,
            })
            .unwrap();
        batch.commit(ctx.store()).unwrap();

        let (_tx, rx) = watch::channel(false);
        assert!(run(p, rx).await.unwrap_err().is_fatal());
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Submitter.to_string(), "submitter");
        assert!(Role::All.indexes() && Role::All.executes() && Role::All.submits());
        assert!(!Role::Dispatcher.submits());
    }
}
