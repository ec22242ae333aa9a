//! Relayer library crate.
//!
//! This crate provides the pipeline that relays confidential contract
//! calls between a sharded ledger and an off-chain execution engine:
//!
//! - the binary wire schema of every record (`types`),
//! - a durable key/value store with atomic batches (`storage`),
//! - clients for the ledger, the execution engine and the blob store
//!   (`chain_client`, `engine`, `blob`),
//! - the indexer, the dispatcher and the shard manager (`indexer`,
//!   `dispatcher`, `shard`),
//! - the pre-launch validator (`validation`),
//! - the loop driver and its per-process context (`orchestrator`),
//! - a keyed task scheduler for load generation (`scheduler`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level relayer configuration (`config`).
//!
//! The `relayer-node` binary composes these pieces into a long-running
//! process.

pub mod blob;
pub mod chain_client;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod shard;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-export top-level configuration types.
pub use config::{
    DispatcherConfig, ExecutionRecovery, IndexerConfig, MetricsConfig, OrchestratorConfig,
    RelayerConfig, ShardConfig,
};
pub use error::{RelayerError, Result};

// Re-export client interfaces and their production implementations.
pub use blob::{BlobConfig, BlobError, BlobStore, GatewayBlobStore, MemoryBlobStore};
pub use chain_client::{ChainClient, ChainClientConfig, ChainError, ChainTx, HttpChainClient};
pub use engine::{EngineConfig, EngineError, EngineTransport, ExecutionEngine};

// Re-export storage backends.
pub use storage::{InMemoryStore, RocksDbConfig, RocksDbStore, StorageError, Store, StoreExt};

// Re-export pipeline components.
pub use dispatcher::Dispatcher;
pub use identity::KeeperIdentity;
pub use indexer::Indexer;
pub use orchestrator::{Pipeline, RelayerContext, Role, run};
pub use scheduler::{SchedulerConfig, TaskKey, TaskScheduler};
pub use shard::{ShardManager, TxBuffer, beacon_is_turn};
pub use validation::Validator;

// Re-export metrics registry and relayer metrics.
pub use metrics::{MetricsRegistry, RelayerMetrics, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;
