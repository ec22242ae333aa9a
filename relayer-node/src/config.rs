//! Node configuration.
//!
//! Every knob is a CLI flag with an environment-variable fallback. The
//! ledger endpoint, store path and signing seed are read from
//! `RELAYER_CHAIN_ENDPOINT`, `RELAYER_STORE_PATH` and `RELAYER_SEED`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use relayer::{EngineTransport, ExecutionRecovery, RelayerConfig, ShardId};

/// Configuration for the status HTTP server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Recovery {
    /// Refuse to start.
    Abort,
    /// Reset the execution watermark to the index watermark.
    Reset,
}

#[derive(Args, Clone, Debug)]
pub struct NodeOpts {
    /// Ledger JSON-RPC endpoint
    #[arg(long, env = "RELAYER_CHAIN_ENDPOINT", default_value = "http://127.0.0.1:9933")]
    pub chain_endpoint: String,

    /// Local store directory
    #[arg(long, env = "RELAYER_STORE_PATH", default_value = "data/relayer-db")]
    pub store_path: String,

    /// Seed the keeper identity is derived from
    #[arg(long, env = "RELAYER_SEED", hide_env_values = true)]
    pub seed: String,

    /// Execution engine HTTP endpoint
    #[arg(long, env = "RELAYER_ENGINE_ENDPOINT", default_value = "http://127.0.0.1:8090")]
    pub engine_endpoint: String,

    /// Execution engine binary; takes precedence over the HTTP endpoint
    #[arg(long, env = "RELAYER_ENGINE_BINARY")]
    pub engine_binary: Option<PathBuf>,

    /// Extra arguments passed to the engine binary
    #[arg(long, env = "RELAYER_ENGINE_ARGS", value_delimiter = ' ', allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Engine call timeout in seconds
    #[arg(long, env = "RELAYER_ENGINE_TIMEOUT_SECS", default_value_t = 60)]
    pub engine_timeout_secs: u64,

    /// Blob store gateways, tried in order
    #[arg(long, env = "RELAYER_BLOB_GATEWAYS", value_delimiter = ',', default_value = "http://127.0.0.1:5001")]
    pub blob_gateways: Vec<String>,

    /// Shards owned by this relayer
    #[arg(long, env = "RELAYER_SHARDS", value_delimiter = ',', default_value = "0")]
    pub shards: Vec<ShardId>,

    /// Blocks indexed between two store flushes
    #[arg(long, env = "RELAYER_FLUSH_EVERY", default_value_t = 1000)]
    pub flush_every: u32,

    /// Attempts per block fetch
    #[arg(long, env = "RELAYER_FETCH_ATTEMPTS", default_value_t = 3)]
    pub fetch_attempts: u32,

    /// Backoff between fetch attempts in milliseconds
    #[arg(long, env = "RELAYER_FETCH_BACKOFF_MS", default_value_t = 500)]
    pub fetch_backoff_ms: u64,

    /// Transactions that trigger a batch submission
    #[arg(long, env = "RELAYER_BATCH_SIZE", default_value_t = 16)]
    pub batch_size: usize,

    /// Blocks a queued transaction may wait before submission
    #[arg(long, env = "RELAYER_BATCH_LAG", default_value_t = 2)]
    pub batch_lag: u32,

    /// Blocks before expiration at which the registration is renewed
    #[arg(long, env = "RELAYER_REGISTRATION_MARGIN", default_value_t = 10)]
    pub registration_margin: u32,

    /// Submission attempts before a batch is dropped
    #[arg(long, env = "RELAYER_MAX_SUBMIT_ATTEMPTS", default_value_t = 3)]
    pub max_submit_attempts: u32,

    /// Sleep between idle loop iterations in seconds
    #[arg(long, env = "RELAYER_BLOCK_INTERVAL_SECS", default_value_t = 6)]
    pub block_interval_secs: u64,

    /// Time allowed for a graceful shutdown in seconds
    #[arg(long, env = "RELAYER_SHUTDOWN_GRACE_SECS", default_value_t = 15)]
    pub shutdown_grace_secs: u64,

    /// What to do when the execution watermark is ahead of the index
    #[arg(long, env = "RELAYER_EXECUTION_RECOVERY", value_enum, default_value_t = Recovery::Abort)]
    pub execution_recovery: Recovery,

    /// Skip the startup validation pass
    #[arg(long, env = "RELAYER_SKIP_VALIDATION")]
    pub skip_validation: bool,

    /// Prometheus exporter address
    #[arg(long, env = "RELAYER_METRICS_ADDR", default_value = "127.0.0.1:9898")]
    pub metrics_addr: SocketAddr,

    /// Disable the Prometheus exporter
    #[arg(long, env = "RELAYER_NO_METRICS")]
    pub no_metrics: bool,

    /// Health and status server address
    #[arg(long, env = "RELAYER_STATUS_ADDR", default_value = "127.0.0.1:8081")]
    pub status_addr: SocketAddr,
}

impl NodeOpts {
    pub fn relayer_config(&self) -> RelayerConfig {
        let mut cfg = RelayerConfig::default();
        cfg.shards = self.shards.clone();
        cfg.chain.endpoint = self.chain_endpoint.clone();
        cfg.storage.path = self.store_path.clone();

        cfg.engine.transport = match &self.engine_binary {
            Some(program) => EngineTransport::Process {
                program: program.clone(),
                args: self.engine_args.clone(),
            },
            None => EngineTransport::Http {
                endpoint: self.engine_endpoint.clone(),
            },
        };
        cfg.engine.timeout = Duration::from_secs(self.engine_timeout_secs);
        cfg.blob.gateways = self.blob_gateways.clone();

        cfg.indexer.flush_every = self.flush_every;
        cfg.indexer.fetch_retry.max_attempts = self.fetch_attempts;
        cfg.indexer.fetch_retry.backoff = Duration::from_millis(self.fetch_backoff_ms);

        cfg.shard.batch_size = self.batch_size;
        cfg.shard.batch_lag = self.batch_lag;
        cfg.shard.registration_margin = self.registration_margin;
        cfg.shard.max_submit_attempts = self.max_submit_attempts;

        cfg.orchestrator.block_interval = Duration::from_secs(self.block_interval_secs);
        cfg.orchestrator.shutdown_grace = Duration::from_secs(self.shutdown_grace_secs);
        cfg.orchestrator.validate_on_start = !self.skip_validation;
        cfg.orchestrator.execution_recovery = match self.execution_recovery {
            Recovery::Abort => ExecutionRecovery::Abort,
            Recovery::Reset => ExecutionRecovery::Reset,
        };

        cfg.metrics.enabled = !self.no_metrics;
        cfg.metrics.listen_addr = self.metrics_addr;
        cfg
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            listen_addr: self.status_addr,
        }
    }
}
