//! Load generator that pushes random calls onto the ledger.
//!
//! Every round each account posts one `function_call` followed by a
//! `view_call` on a contract. Posts for the same `(shard, contract)` go
//! through one scheduler worker and keep their order; different contracts
//! are posted concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Args;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;

use relayer::{
    Call, CallAction, Calls, ChainClient, ChainTx, HttpChainClient, KeeperIdentity,
    RelayerConfig, SchedulerConfig, ShardId, TaskKey, TaskScheduler,
};

const METHODS: &[&str] = &["increment", "decrement", "set"];

#[derive(Args, Clone, Debug)]
pub struct ChaosArgs {
    /// Number of synthetic accounts
    #[arg(long, default_value_t = 8)]
    pub accounts: usize,

    /// Calls posted per account
    #[arg(long, default_value_t = 10)]
    pub rounds: u32,

    /// Target contracts
    #[arg(long, value_delimiter = ',', default_value = "counter")]
    pub contracts: Vec<String>,

    /// Contracts posted to concurrently
    #[arg(long, default_value_t = 4)]
    pub workers: usize,
}

/// Builds a `function_call` + `view_call` pair from `origin` to `contract`.
pub fn random_pair(rng: &mut impl Rng, shard: ShardId, origin: &str, contract: &str) -> Calls {
    let method = METHODS.choose(rng).copied().unwrap_or("increment");
    let args = serde_json::json!({ "by": rng.random_range(1..100u32) }).to_string();
    Calls::new(
        shard,
        None,
        vec![
            Call::new(origin, CallAction::FunctionCall, contract).with_method(method, args),
            Call::new(origin, CallAction::ViewCall, contract).with_method("get", "{}"),
        ],
    )
}

pub async fn run(config: &RelayerConfig, identity: &KeeperIdentity, args: ChaosArgs) -> Result<(), String> {
    if args.contracts.is_empty() {
        return Err("no target contracts".to_string());
    }

    let chain_cfg = config.chain.clone();
    let signer = identity.account().to_string();
    let chain: Arc<dyn ChainClient> = Arc::new(
        tokio::task::spawn_blocking(move || HttpChainClient::new(&chain_cfg, signer))
            .await
            .map_err(|e| format!("ledger client setup failed: {e}"))?
            .map_err(|e| format!("failed to create ledger client: {e}"))?,
    );

    let shard = config.shards.first().copied().unwrap_or(0);
    let accounts: Vec<String> = (0..args.accounts).map(|i| format!("chaos-{i}")).collect();
    let posted = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let scheduler_cfg = SchedulerConfig {
        max_workers: args.workers,
        ..SchedulerConfig::default()
    };
    let (ok, err) = (posted.clone(), failed.clone());
    let client = chain.clone();
    let mut scheduler = TaskScheduler::new(scheduler_cfg, move |key: &TaskKey, calls: Calls| {
        let tx = match ChainTx::push_call(key.0, &calls) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode calls");
                err.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        match client.submit(tx) {
            Ok(()) => {
                ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(shard = key.0, contract = %key.1, error = %e, "push failed");
                err.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let mut rng = StdRng::from_os_rng();
    tracing::info!(accounts = accounts.len(), rounds = args.rounds, shard, "chaos run started");
    for round in 0..args.rounds as usize {
        for (i, account) in accounts.iter().enumerate() {
            let contract = &args.contracts[(round + i) % args.contracts.len()];
            let calls = random_pair(&mut rng, shard, account, contract);
            scheduler
                .submit((shard, contract.clone()), calls)
                .await
                .map_err(|e| e.to_string())?;
        }
    }
    scheduler.shutdown().await;
    // Blocking clients are released on the blocking pool.
    let _ = tokio::task::spawn_blocking(move || drop(chain)).await;

    tracing::info!(
        posted = posted.load(Ordering::Relaxed),
        failed = failed.load(Ordering::Relaxed),
        "chaos run finished"
    );
    Ok(())
}
