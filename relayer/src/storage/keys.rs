//! Deterministic key layout.
//!
//! Per-shard records are keyed by a zero-padded shard id, a zero-padded
//! index and a four-letter type suffix, so keys of one type sort by shard
//! and then by index:
//!
//! | record           | key                                   |
//! |------------------|---------------------------------------|
//! | call             | `{shard:04}{call_index:016}RAWC`       |
//! | outcomes         | `{shard:04}{call_index:016}OUTC`       |
//! | block            | `{shard:04}{block:016}BLOC`            |
//! | block summary    | `{shard:04}{block:016}BSUM`            |
//! | contract         | `{shard:020}{name}CONT`                |
//! | shard            | `{shard:020}SHAR`                      |
//! | shard metadata   | `{shard:020}SHAM`                      |
//! | local metadata   | `METADATA`                             |
//! | execution summary| `EXECUTION_SUMMARY`                    |

use crate::types::{BlockNumber, CallIndex, ShardId};

pub const LOCAL_METADATA: &[u8] = b"METADATA";
pub const EXECUTION_SUMMARY: &[u8] = b"EXECUTION_SUMMARY";

pub fn call(shard: ShardId, call_index: CallIndex) -> Vec<u8> {
    format!("{shard:04}{call_index:016}RAWC").into_bytes()
}

pub fn outcomes(shard: ShardId, call_index: CallIndex) -> Vec<u8> {
    format!("{shard:04}{call_index:016}OUTC").into_bytes()
}

pub fn block(shard: ShardId, block: BlockNumber) -> Vec<u8> {
    format!("{shard:04}{block:016}BLOC").into_bytes()
}

pub fn block_summary(shard: ShardId, block: BlockNumber) -> Vec<u8> {
    format!("{shard:04}{block:016}BSUM").into_bytes()
}

pub fn contract(shard: ShardId, name: &str) -> Vec<u8> {
    format!("{shard:020}{name}CONT").into_bytes()
}

pub fn shard(shard: ShardId) -> Vec<u8> {
    format!("{shard:020}SHAR").into_bytes()
}

pub fn shard_metadata(shard: ShardId) -> Vec<u8> {
    format!("{shard:020}SHAM").into_bytes()
}

/// Whether `key` is one of the two singleton watermark keys.
pub fn is_singleton(key: &[u8]) -> bool {
    key == LOCAL_METADATA || key == EXECUTION_SUMMARY
}

/// Printable form of a key for logs and errors.
pub fn display(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
