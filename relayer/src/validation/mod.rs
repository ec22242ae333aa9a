//! Pre-launch consistency checks of the local cache against the ledger.
//!
//! The relayer's store is a cache of the remote call log plus the results
//! of executing it. Before the loops start, the [`Validator`] walks the
//! cache and rolls back any watermark whose blocks no longer agree with
//! the ledger:
//!
//! - [`Validator::validate_indexer`] compares indexed calls with the
//!   remote call history and truncates the index watermark,
//! - [`Validator::validate_executor`] compares persisted outcomes with the
//!   confirmed remote outcomes and truncates the execution watermark.
//!
//! Truncation is the only repair; the affected blocks are re-indexed or
//! re-executed by the regular loops.

mod executor;
mod indexer;

use thiserror::Error;

use crate::chain_client::ChainError;
use crate::error::{RelayerError, Result};
use crate::orchestrator::RelayerContext;
use crate::storage::StorageError;
use crate::types::{BlockNumber, EncodingError};

/// Why a block failed validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("local read failed: {0}")]
    Local(#[from] StorageError),
    #[error("remote read failed: {0}")]
    Remote(#[from] ChainError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("{0}")]
    Mismatch(String),
}

/// Watermarks left in place after validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedWatermarks {
    pub index: BlockNumber,
    pub execution: BlockNumber,
}

#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Runs both validators, index first.
    ///
    /// Only an execution watermark that was already above the index
    /// watermark before validation goes through [`ExecutionRecovery`].
    /// When the index validator rolls back below executed blocks, the
    /// execution watermark follows it down.
    ///
    /// [`ExecutionRecovery`]: crate::config::ExecutionRecovery
    pub fn validate_all(&self, ctx: &RelayerContext) -> Result<ValidatedWatermarks> {
        self.recover_execution_ahead(ctx)?;
        let index = self.validate_indexer(ctx, None, None)?;
        executor::clamp_execution(ctx, index)?;
        let execution = self.validate_executor(ctx, None, None)?;
        tracing::info!(index, execution, "local state validated");
        Ok(ValidatedWatermarks { index, execution })
    }
}

/// Clamps an optional `[start, end]` range to `[1, watermark]`.
fn block_range(
    start: Option<BlockNumber>,
    end: Option<BlockNumber>,
    watermark: BlockNumber,
) -> std::ops::RangeInclusive<BlockNumber> {
    let start = start.unwrap_or(1).max(1);
    let end = end.unwrap_or(watermark).min(watermark);
    start..=end
}

fn fatal(what: &str, e: impl std::fmt::Display) -> RelayerError {
    RelayerError::Fatal(format!("{what}: {e}"))
}
