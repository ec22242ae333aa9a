//! Per-process context threaded through every pipeline call.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::chain_client::ChainClient;
use crate::config::RelayerConfig;
use crate::engine::ExecutionEngine;
use crate::identity::KeeperIdentity;
use crate::metrics::RelayerMetrics;
use crate::storage::Store;

/// Everything a pipeline component needs, owned by the orchestrator.
///
/// Components never keep their own handles to collaborators; they receive
/// the context on every call, so tests can swap any collaborator for a
/// scripted one.
pub struct RelayerContext {
    pub config: RelayerConfig,
    pub identity: KeeperIdentity,
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainClient>,
    pub engine: Arc<dyn ExecutionEngine>,
    pub blobs: Arc<dyn BlobStore>,
    pub metrics: RelayerMetrics,
}

impl RelayerContext {
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}
