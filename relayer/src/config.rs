//! Top-level configuration for a relayer process.
//!
//! This module aggregates configuration for:
//!
//! - the ledger client (endpoint + timeout),
//! - storage (RocksDB path and flags),
//! - the execution engine and blob store clients,
//! - per-component tunables (indexer flushing, submission batching),
//! - the loop driver (block interval, shutdown grace, recovery policy),
//! - the metrics exporter.
//!
//! Binaries construct a [`RelayerConfig`] from defaults and override
//! fields from flags or environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::blob::BlobConfig;
use crate::chain_client::ChainClientConfig;
use crate::engine::EngineConfig;
use crate::retry::RetryPolicy;
use crate::storage::RocksDbConfig;
use crate::types::{ROOT_AUTHORITY, ShardId};

/// Indexer tunables.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Number of processed blocks after which buffered writes are flushed.
    pub flush_every: u32,
    /// Retry policy for fetching one block.
    pub fetch_retry: RetryPolicy,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            flush_every: 1_000,
            fetch_retry: RetryPolicy::default(),
        }
    }
}

/// Dispatcher tunables.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// The only origin allowed to create accounts and deploy contracts.
    pub root_origin: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            root_origin: ROOT_AUTHORITY.to_string(),
        }
    }
}

/// Shard manager and submitter tunables.
#[derive(Clone, Debug)]
pub struct ShardConfig {
    /// Registration is renewed when it expires within this many blocks.
    pub registration_margin: u32,
    /// Submit once this many transactions are buffered.
    pub batch_size: usize,
    /// Submit once the oldest buffered transaction is this many blocks old.
    pub batch_lag: u32,
    /// Attempts for one batch before it is dropped.
    pub max_submit_attempts: u32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            registration_margin: 10,
            batch_size: 16,
            batch_lag: 2,
            max_submit_attempts: 3,
        }
    }
}

/// What to do when the execution watermark is ahead of the index watermark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionRecovery {
    /// Refuse to start.
    #[default]
    Abort,
    /// Rewrite the execution watermark down to the index watermark.
    Reset,
}

/// Loop driver configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Back-off after an iteration that found no work.
    pub block_interval: Duration,
    /// Bound on the graceful-shutdown sequence before a forced exit.
    pub shutdown_grace: Duration,
    pub execution_recovery: ExecutionRecovery,
    /// Whether the startup validator runs before the loop.
    pub validate_on_start: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(6),
            shutdown_grace: Duration::from_secs(15),
            execution_recovery: ExecutionRecovery::Abort,
            validate_on_start: true,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9898)),
        }
    }
}

/// Top-level configuration for a relayer process.
#[derive(Clone, Debug)]
pub struct RelayerConfig {
    /// Shards owned by this relayer.
    pub shards: Vec<ShardId>,
    pub chain: ChainClientConfig,
    pub storage: RocksDbConfig,
    pub engine: EngineConfig,
    pub blob: BlobConfig,
    pub indexer: IndexerConfig,
    pub dispatcher: DispatcherConfig,
    pub shard: ShardConfig,
    pub orchestrator: OrchestratorConfig,
    pub metrics: MetricsConfig,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            shards: vec![0],
            chain: ChainClientConfig::default(),
            storage: RocksDbConfig::default(),
            engine: EngineConfig::default(),
            blob: BlobConfig::default(),
            indexer: IndexerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            shard: ShardConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
