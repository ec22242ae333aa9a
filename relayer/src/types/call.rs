//! Calls posted on the ledger and the envelope they are stored in.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{Codec, EncodingError};
use super::{BlockNumber, CallIndex, HASH_LEN, ShardId};

/// The closed set of actions a [`Call`] may carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CallAction {
    CreateAccount,
    Transfer,
    FunctionCall,
    ViewCall,
    Deploy,
}

impl CallAction {
    /// Whether the action may only be issued by the root authority.
    pub fn requires_root(self) -> bool {
        matches!(self, CallAction::CreateAccount | CallAction::Deploy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallAction::CreateAccount => "create_account",
            CallAction::Transfer => "transfer",
            CallAction::FunctionCall => "function_call",
            CallAction::ViewCall => "view_call",
            CallAction::Deploy => "deploy",
        }
    }
}

impl fmt::Display for CallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transaction-like operation against a confidential contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Account that posted the call.
    pub origin: String,
    /// Public key of `origin`.
    pub origin_public_key: [u8; HASH_LEN],
    /// Whether the outcome must be encrypted for the origin.
    pub encrypted_egress: bool,
    pub action: CallAction,
    /// Receiving account or contract name.
    pub receiver: String,
    pub amount: Option<u128>,
    pub method: Option<String>,
    pub args: Option<Vec<u8>>,
    /// Blob-store reference of the contract code, for `deploy`.
    pub wasm_blob_path: Option<String>,
    /// Contract code inlined by the dispatcher before execution.
    pub wasm_code: Option<Vec<u8>>,
}

impl Call {
    /// Creates a call with every optional field unset.
    pub fn new(origin: impl Into<String>, action: CallAction, receiver: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            origin_public_key: [0u8; HASH_LEN],
            encrypted_egress: false,
            action,
            receiver: receiver.into(),
            amount: None,
            method: None,
            args: None,
            wasm_blob_path: None,
            wasm_code: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>, args: impl Into<Vec<u8>>) -> Self {
        self.method = Some(method.into());
        self.args = Some(args.into());
        self
    }

    pub fn with_amount(mut self, amount: u128) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_blob(mut self, path: impl Into<String>) -> Self {
        self.wasm_blob_path = Some(path.into());
        self
    }
}

/// An ordered batch of calls posted under one call index.
///
/// The order of `ops` is the execution order. An empty batch has a
/// dedicated wire form: it encodes to an empty buffer, and an empty buffer
/// decodes to `Calls::default()`. The shard and block fields of an empty
/// batch are therefore not carried on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calls {
    pub ops: Vec<Call>,
    pub shard_id: ShardId,
    pub block_number: Option<BlockNumber>,
}

impl Calls {
    pub fn new(shard_id: ShardId, block_number: Option<BlockNumber>, ops: Vec<Call>) -> Self {
        Self {
            ops,
            shard_id,
            block_number,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Codec for Calls {
    fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        if self.ops.is_empty() {
            return Ok(Vec::new());
        }
        super::codec::encode(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.is_empty() {
            return Ok(Calls::default());
        }
        super::codec::decode(bytes)
    }
}

/// Payload of a call as indexed from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPayload {
    /// A well-formed [`Calls`] buffer.
    Parsed(Calls),
    /// Bytes that do not parse as [`Calls`], typically sealed for the
    /// execution engine. Stored and forwarded verbatim.
    Opaque(Vec<u8>),
}

impl CallPayload {
    /// Classifies a remote payload.
    ///
    /// A payload is only considered parsed when it decodes and re-encodes
    /// to the exact same bytes, so [`CallPayload::to_wire`] always returns
    /// what the ledger holds.
    pub fn from_remote(bytes: Vec<u8>) -> Self {
        match Calls::decode(&bytes) {
            Ok(calls) if calls.encode().is_ok_and(|again| again == bytes) => {
                CallPayload::Parsed(calls)
            }
            _ => CallPayload::Opaque(bytes),
        }
    }

    /// The bytes this payload was posted as.
    pub fn to_wire(&self) -> Result<Vec<u8>, EncodingError> {
        match self {
            CallPayload::Parsed(calls) => calls.encode(),
            CallPayload::Opaque(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn as_calls(&self) -> Option<&Calls> {
        match self {
            CallPayload::Parsed(calls) => Some(calls),
            CallPayload::Opaque(_) => None,
        }
    }
}

/// A call as persisted by the indexer: its index, origin, and payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_index: CallIndex,
    pub origin: String,
    pub payload: CallPayload,
}

impl Codec for CallRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ROOT_AUTHORITY;

    fn sample_calls() -> Calls {
        Calls::new(
            0,
            Some(12),
            vec![
                Call::new(ROOT_AUTHORITY, CallAction::Deploy, "status_message")
                    .with_blob("bafyreihash"),
                Call::new("alice", CallAction::FunctionCall, "status_message")
                    .with_method("set_status", br#"{"message":"hi"}"#.to_vec()),
                Call::new("bob", CallAction::Transfer, "alice").with_amount(u128::MAX),
            ],
        )
    }

    #[test]
    fn calls_roundtrip_preserves_order_and_fields() {
        let calls = sample_calls();
        let bytes = calls.encode().expect("encode");
        assert_eq!(Calls::decode(&bytes).expect("decode"), calls);
    }

    #[test]
    fn empty_calls_encode_to_empty_buffer() {
        let empty = Calls::new(3, Some(9), Vec::new());
        assert!(empty.encode().expect("encode").is_empty());
        assert_eq!(Calls::decode(&[]).expect("decode"), Calls::default());
    }

    #[test]
    fn remote_payload_classification() {
        let bytes = sample_calls().encode().expect("encode");
        assert_eq!(
            CallPayload::from_remote(bytes.clone()),
            CallPayload::Parsed(sample_calls())
        );

        let sealed = vec![0xFE, 0xED, 0xFA, 0xCE, 0x01];
        let payload = CallPayload::from_remote(sealed.clone());
        assert_eq!(payload, CallPayload::Opaque(sealed.clone()));
        assert_eq!(payload.to_wire().expect("wire"), sealed);
    }

    #[test]
    fn call_record_roundtrip_with_opaque_payload() {
        let record = CallRecord {
            call_index: 42,
            origin: "alice".to_string(),
            payload: CallPayload::Opaque(vec![9; 64]),
        };
        let bytes = record.encode().expect("encode");
        assert_eq!(CallRecord::decode(&bytes).expect("decode"), record);
    }

    #[test]
    fn only_create_account_and_deploy_require_root() {
        assert!(CallAction::CreateAccount.requires_root());
        assert!(CallAction::Deploy.requires_root());
        assert!(!CallAction::Transfer.requires_root());
        assert!(!CallAction::FunctionCall.requires_root());
        assert!(!CallAction::ViewCall.requires_root());
    }
}
