//! Core domain types shared by every relayer component.
//!
//! Every persisted or wire-level entity lives here, together with the
//! binary codec used to encode them. The goal is to avoid "naked" byte
//! buffers and bare integers in public APIs and instead use named types
//! whose field order is fixed by their definition.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod block;
pub mod call;
pub mod codec;
pub mod outcome;
pub mod shard;

pub use block::{Block, BlockSummary, Contract};
pub use call::{Call, CallAction, CallPayload, CallRecord, Calls};
pub use codec::{Codec, EncodingError};
pub use outcome::{EngineOutcomes, Outcome, Outcomes};
pub use shard::{ExecutionSummary, LocalMetadata, Shard, ShardMetadata, ShardMetadataError};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Identifier of a ledger shard.
pub type ShardId = u32;

/// Global index of a call posted on the ledger.
pub type CallIndex = u32;

/// Ledger block height.
pub type BlockNumber = u32;

/// Account allowed to create accounts and deploy contracts.
pub const ROOT_AUTHORITY: &str = "5EYCAe5jKbSe4DzkVVriG3QW13WG4j9gy4zmUxjqT8czBuyu";

/// Strongly-typed 256-bit value (BLAKE3-256 digests, state roots, keys).
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero value, used as the genesis state root.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte value as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lower-case hex encoding without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 32-byte hex string, with or without a `0x` prefix.
    ///
    /// Returns `None` for anything that is not exactly 32 bytes of hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    /// Copies a 32-byte slice into a [`Hash256`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_hex_roundtrip() {
        let h = Hash256::compute(b"state");
        let parsed = Hash256::from_hex(&h.to_string()).expect("0x-prefixed hex should parse");
        assert_eq!(parsed, h);
        assert_eq!(Hash256::from_hex(&h.to_hex()), Some(h));
    }

    #[test]
    fn hash256_from_hex_rejects_wrong_length_and_garbage() {
        assert_eq!(Hash256::from_hex("0xdeadbeef"), None);
        assert_eq!(Hash256::from_hex("not hex at all"), None);
        assert_eq!(Hash256::from_hex(""), None);
    }
}
