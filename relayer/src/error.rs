//! Pipeline-level error taxonomy.
//!
//! Component clients keep their own error types ([`ChainError`],
//! [`EngineError`], [`BlobError`], [`StorageError`]); the pipeline wraps
//! them into [`RelayerError`] and decides how each kind is contained:
//!
//! - `TransientFetch`: the block is retried on a later tick, the index
//!   watermark stays below it,
//! - `Authorization` / `TransferNotPermitted` / `MissingCode`: the call is
//!   dropped and the rest of the block still executes,
//! - `Corruption`: local and remote state diverge, handled by watermark
//!   rollback,
//! - `Engine`: the block is left un-executed and retried,
//! - `Fatal`: aborts startup.

use thiserror::Error;

use crate::blob::BlobError;
use crate::chain_client::ChainError;
use crate::dispatcher::frame::FrameError;
use crate::engine::EngineError;
use crate::storage::StorageError;
use crate::types::{BlockNumber, CallAction, EncodingError};

#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("fetching block {block} failed: {source}")]
    TransientFetch {
        block: BlockNumber,
        #[source]
        source: ChainError,
    },
    #[error("{origin} is not allowed to {action}")]
    Authorization { origin: String, action: CallAction },
    #[error("transfer from {origin} is not permitted")]
    TransferNotPermitted { origin: String },
    #[error("no code reference for contract {contract}")]
    MissingCode { contract: String },
    #[error("local state diverges from the ledger: {0}")]
    Corruption(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl RelayerError {
    /// Whether the error drops a single call rather than failing its block.
    pub fn is_call_rejection(&self) -> bool {
        matches!(
            self,
            RelayerError::Authorization { .. }
                | RelayerError::TransferNotPermitted { .. }
                | RelayerError::MissingCode { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayerError::Fatal(_))
    }
}

pub type Result<T, E = RelayerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_classified() {
        let auth = RelayerError::Authorization {
            origin: "mallory".into(),
            action: CallAction::Deploy,
        };
        assert!(auth.is_call_rejection());
        assert_eq!(auth.to_string(), "mallory is not allowed to deploy");

        let engine = RelayerError::from(EngineError::Failed("trap".into()));
        assert!(!engine.is_call_rejection());
        assert!(!engine.is_fatal());
        assert!(RelayerError::Fatal("x".into()).is_fatal());
    }
}
