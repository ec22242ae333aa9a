//! Identity this relayer uses on the ledger.
//!
//! Key management lives outside the relayer. The identity is derived
//! deterministically from the configured seed, and the seed itself is not
//! retained.

use crate::types::Hash256;

const ATTESTATION_CONTEXT: &str = "relayer keeper registration v1";

/// Committee identity of this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeeperIdentity {
    public_key: Hash256,
    account: String,
    attestation: Vec<u8>,
}

impl KeeperIdentity {
    /// Derives the identity from a signing seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        let public_key = Hash256::compute(seed);
        let key = blake3::derive_key(ATTESTATION_CONTEXT, seed);
        let attestation = blake3::keyed_hash(&key, public_key.as_bytes())
            .as_bytes()
            .to_vec();
        Self {
            public_key,
            account: public_key.to_hex(),
            attestation,
        }
    }

    pub fn public_key(&self) -> &Hash256 {
        &self.public_key
    }

    /// Account name under which this node appears in committees.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Proof of key possession sent with registration transactions.
    pub fn attestation(&self) -> &[u8] {
        &self.attestation
    }
}
