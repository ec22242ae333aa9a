//! Relayer node binary.
//!
//! This binary runs the relayer pipeline on top of the `relayer` crate:
//!
//! - `indexer`, `dispatcher`, `submitter` run one stage each, `all` runs
//!   the three in one loop. The store is locked by the process that opens
//!   it, so stages sharing a store run in one process under `all`,
//! - `chaos` pushes random calls onto the ledger for load testing.
//!
//! Long-running roles serve `GET /health` and `GET /status`, a Prometheus
//! exporter on `/metrics`, and shut down gracefully on SIGINT/SIGTERM.

mod chaos;
mod config;
mod routes;
mod state;

use std::sync::Arc;

use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use relayer::{
    GatewayBlobStore, HttpChainClient, KeeperIdentity, MetricsRegistry, Pipeline, RelayerConfig,
    RelayerContext, RelayerMetrics, Role, RocksDbStore, StorageError, run_prometheus_http_server,
};

use chaos::ChaosArgs;
use config::NodeOpts;
use routes::{health, status};
use state::AppState;

#[derive(Parser)]
#[command(name = "relayer-node")]
#[command(about = "Relays confidential contract calls between a sharded ledger and an execution engine")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    opts: NodeOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index ledger calls into the local store
    Indexer,
    /// Execute indexed blocks through the engine
    Dispatcher,
    /// Report outcomes and keep the committee registration alive
    Submitter,
    /// Run every stage in one process
    All,
    /// Push random calls onto the ledger
    Chaos(ChaosArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("relayer=info,relayer_node=info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("fatal error: {e}");
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let relayer_cfg = cli.opts.relayer_config();
    let api_cfg = cli.opts.api_config();
    let identity = KeeperIdentity::from_seed(cli.opts.seed.as_bytes());

    let role = match cli.command {
        Command::Indexer => Role::Indexer,
        Command::Dispatcher => Role::Dispatcher,
        Command::Submitter => Role::Submitter,
        Command::All => Role::All,
        Command::Chaos(args) => return chaos::run(&relayer_cfg, &identity, args).await,
    };

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if relayer_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = relayer_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Store + clients
    // ---------------------------

    let ctx = {
        let cfg = relayer_cfg.clone();
        let relayer_metrics = metrics.relayer.clone();
        tokio::task::spawn_blocking(move || build_context(cfg, identity, relayer_metrics))
            .await
            .map_err(|e| format!("context setup failed: {e}"))??
    };
    tracing::info!(
        role = %role,
        account = ctx.identity.account(),
        shards = ?ctx.config.shards,
        "relayer context ready"
    );

    // ---------------------------
    // Status HTTP server
    // ---------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/status", get(status::status))
        .with_state(Arc::new(AppState {
            ctx: ctx.clone(),
            role,
        }));

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;
    tracing::info!("status server listening on http://{}", api_cfg.listen_addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // ---------------------------
    // Pipeline loop
    // ---------------------------

    let mut pipeline = tokio::spawn(relayer::run(Pipeline::new(ctx.clone(), role), shutdown_rx));

    let outcome = tokio::select! {
        joined = &mut pipeline => {
            let _ = shutdown_tx.send(true);
            Some(joined)
        }
        signal = shutdown_signal() => {
            tracing::info!(signal, "shutdown signal received");
            let _ = shutdown_tx.send(true);
            None
        }
    };

    let joined = match outcome {
        Some(joined) => joined,
        None => {
            let grace = relayer_cfg.orchestrator.shutdown_grace;
            match tokio::time::timeout(grace, &mut pipeline).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::error!(?grace, "graceful shutdown timed out, forcing exit");
                    std::process::exit(1);
                }
            }
        }
    };

    if let Ok(Err(e)) = server.await {
        tracing::warn!("status server error: {e}");
    }
    tokio::task::spawn_blocking(move || drop(ctx))
        .await
        .map_err(|e| format!("closing the store failed: {e}"))?;

    joined
        .map_err(|e| format!("pipeline task failed: {e}"))?
        .map_err(|e| e.to_string())
}

/// Opens the store and connects every collaborator.
///
/// Runs on the blocking pool: the ledger, engine and blob clients are
/// blocking clients.
fn build_context(
    cfg: RelayerConfig,
    identity: KeeperIdentity,
    metrics: RelayerMetrics,
) -> Result<Arc<RelayerContext>, String> {
    let store = RocksDbStore::open(&cfg.storage).map_err(|e| match e {
        StorageError::Locked { path } => format!(
            "store at {path} is held by another relayer process; \
             roles that share a store must run together under `all`"
        ),
        e => format!("failed to open RocksDB store at {}: {e}", cfg.storage.path),
    })?;
    let chain = HttpChainClient::new(&cfg.chain, identity.account())
        .map_err(|e| format!("failed to create ledger client: {e}"))?;
    let engine = relayer::engine::connect(&cfg.engine)
        .map_err(|e| format!("failed to create engine client: {e}"))?;
    let blobs = GatewayBlobStore::new(&cfg.blob)
        .map_err(|e| format!("failed to create blob store client: {e}"))?;

    Ok(Arc::new(RelayerContext {
        config: cfg,
        identity,
        store: Arc::new(store),
        chain: Arc::new(chain),
        engine: Arc::from(engine),
        blobs: Arc::new(blobs),
        metrics,
    }))
}

/// Waits for SIGINT or SIGTERM and returns the signal name.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = tokio::signal::ctrl_c() => "SIGINT",
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, falling back to Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
