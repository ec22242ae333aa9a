//! Content-addressed blob storage for contract code.
//!
//! Contract code is referenced on the ledger by id and fetched from a blob
//! store when a `deploy` call is dispatched. [`http::GatewayBlobStore`]
//! talks to IPFS-style HTTP gateways; [`mem::MemoryBlobStore`] keeps blobs
//! in memory, keyed by their BLAKE3 digest.

pub mod http;
pub mod mem;

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

pub use http::GatewayBlobStore;
pub use mem::MemoryBlobStore;

/// Errors surfaced by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("no blob gateways configured")]
    NoGateways,
    #[error("blob {0} not found")]
    NotFound(String),
    /// Every gateway failed; carries the last failure.
    #[error("all blob gateways failed: {0}")]
    Unavailable(String),
    #[error("malformed blob gateway response: {0}")]
    Protocol(String),
}

/// Content-addressed blob store.
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns their id.
    fn add(&self, bytes: &[u8]) -> Result<String, BlobError>;

    /// Fetches the blob stored under `id`.
    fn get(&self, id: &str) -> Result<Vec<u8>, BlobError>;
}

/// Configuration for the blob store client.
#[derive(Clone, Debug)]
pub struct BlobConfig {
    /// Gateway base URLs, tried in order.
    pub gateways: Vec<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            gateways: vec!["http://127.0.0.1:5001".to_string()],
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}
