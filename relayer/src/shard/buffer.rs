//! Outbound transaction buffer.

use crate::chain_client::ChainTx;
use crate::types::{BlockNumber, ShardId};

/// A built but unsent transaction and the block it originated from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedTransaction {
    /// `-1` marks the sentinel.
    pub block_number: i64,
    pub transaction: Option<ChainTx>,
}

impl QueuedTransaction {
    pub fn new(block_number: BlockNumber, transaction: ChainTx) -> Self {
        Self {
            block_number: i64::from(block_number),
            transaction: Some(transaction),
        }
    }

    /// The "buffer empty" marker.
    pub fn sentinel() -> Self {
        Self {
            block_number: -1,
            transaction: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.transaction.is_none()
    }
}

/// Transactions waiting to be submitted as one batch.
///
/// The buffer is never zero-length: when nothing is queued it holds a
/// single sentinel entry.
#[derive(Clone, Debug)]
pub struct TxBuffer {
    entries: Vec<QueuedTransaction>,
    failed_attempts: u32,
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self {
            entries: vec![QueuedTransaction::sentinel()],
            failed_attempts: 0,
        }
    }
}

impl TxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block_number: BlockNumber, transaction: ChainTx) {
        self.entries.retain(|entry| !entry.is_sentinel());
        self.entries.push(QueuedTransaction::new(block_number, transaction));
    }

    /// Number of queued transactions, sentinel excluded.
    pub fn len(&self) -> usize {
        self.queued().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> &[QueuedTransaction] {
        &self.entries
    }

    pub fn oldest_block(&self) -> Option<BlockNumber> {
        self.queued()
            .map(|entry| entry.block_number)
            .min()
            .and_then(|block| BlockNumber::try_from(block).ok())
    }

    pub fn contains(&self, predicate: impl Fn(&ChainTx) -> bool) -> bool {
        self.queued()
            .filter_map(|entry| entry.transaction.as_ref())
            .any(predicate)
    }

    pub fn transactions(&self) -> Vec<ChainTx> {
        self.queued()
            .filter_map(|entry| entry.transaction.clone())
            .collect()
    }

    /// Highest reported block per shard among queued outcome reports.
    pub fn reported_blocks(&self) -> Vec<(ShardId, BlockNumber)> {
        let mut reported: Vec<(ShardId, BlockNumber)> = Vec::new();
        for tx in self.queued().filter_map(|entry| entry.transaction.as_ref()) {
            if let ChainTx::SubmitOutcome {
                shard_id,
                block_number,
                ..
            } = tx
            {
                match reported.iter_mut().find(|(shard, _)| shard == shard_id) {
                    Some((_, block)) => *block = (*block).max(*block_number),
                    None => reported.push((*shard_id, *block_number)),
                }
            }
        }
        reported
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub(crate) fn record_failure(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }

    /// Back to the single sentinel entry.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn queued(&self) -> impl Iterator<Item = &QueuedTransaction> {
        self.entries.iter().filter(|entry| !entry.is_sentinel())
    }
}
