//! JSON-RPC ledger client.
//!
//! Talks to a ledger node (or a signing gateway in front of it) with
//! JSON-RPC 2.0 over HTTP:
//!
//! ```json
//! POST /
//! { "jsonrpc": "2.0", "id": 7, "method": "parentchain_callHistory", "params": [0, 1200] }
//!
//! { "jsonrpc": "2.0", "id": 7, "result": ["0x2a", "43"] }
//! ```
//!
//! Every scalar in a `result` goes through [`super::scalar`], so missing
//! or malformed values never panic the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::scalar::{parse_bytes, parse_string, parse_string_list, parse_u32, parse_u32_list};
use super::{ChainClient, ChainError, ChainTx, RemoteCall};
use crate::types::{BlockNumber, CallIndex, ShardId};

/// Configuration for [`HttpChainClient`].
#[derive(Clone, Debug)]
pub struct ChainClientConfig {
    /// Ledger RPC endpoint, e.g. `"http://127.0.0.1:9933"`.
    pub endpoint: String,
    /// Timeout of a single RPC request.
    pub timeout: Duration,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9933".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Blocking JSON-RPC implementation of [`ChainClient`].
///
/// Transactions are sent as unsigned descriptors together with the
/// account of this node; signing happens in the gateway that holds the
/// node's key.
pub struct HttpChainClient {
    endpoint: String,
    client: Client,
    signer: String,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl HttpChainClient {
    /// Constructs a client for `cfg.endpoint`, signing as `signer`.
    pub fn new(cfg: &ChainClientConfig, signer: impl Into<String>) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            client,
            signer: signer.into(),
            next_id: AtomicU64::new(1),
        })
    }

    fn rpc(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| ChainError::Transport(format!("{method}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!(
                "{method}: ledger returned HTTP status {status}"
            )));
        }

        let body = resp
            .json::<RpcResponse>()
            .map_err(|e| ChainError::Protocol(format!("{method}: invalid JSON-RPC body: {e}")))?;

        if let Some(err) = body.error {
            return Err(ChainError::Rejected(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }
        Ok(body.result)
    }

    fn query_u32(&self, method: &str, params: Value) -> Result<Option<u32>, ChainError> {
        Ok(parse_u32(&self.rpc(method, params)?))
    }
}

/// JSON shape of a transaction descriptor.
fn tx_params(tx: &ChainTx) -> Value {
    let args = match tx {
        ChainTx::SubmitOutcome {
            block_number,
            shard_id,
            state_root,
            call_indexes,
            outcomes,
        } => json!({
            "block_number": block_number,
            "shard_id": shard_id,
            "state_root": state_root.to_string(),
            "call_index": call_indexes,
            "outcomes": outcomes.iter().map(|o| format!("0x{}", hex::encode(o))).collect::<Vec<_>>(),
        }),
        ChainTx::RegisterSecretKeeper {
            public_key,
            attestation,
        }
        | ChainTx::RenewRegistration {
            public_key,
            attestation,
        } => json!({
            "public_key": public_key.to_string(),
            "signature": format!("0x{}", hex::encode(attestation)),
        }),
        ChainTx::RegisterRunningShard { shard_id } => json!({ "shard_id": shard_id }),
        ChainTx::PushCall { shard_id, calls } => json!({
            "shard_id": shard_id,
            "calls": format!("0x{}", hex::encode(calls)),
        }),
        ChainTx::Batch(txs) => json!({ "calls": txs.iter().map(tx_params).collect::<Vec<_>>() }),
    };
    json!({ "method": tx.method(), "args": args })
}

impl ChainClient for HttpChainClient {
    fn block_number(&self) -> Result<BlockNumber, ChainError> {
        self.query_u32("chain_blockNumber", json!([]))?
            .ok_or_else(|| ChainError::Missing("head block number".into()))
    }

    fn call_history(
        &self,
        shard: ShardId,
        block: BlockNumber,
    ) -> Result<Vec<CallIndex>, ChainError> {
        let result = self.rpc("parentchain_callHistory", json!([shard, block]))?;
        parse_u32_list(&result).ok_or_else(|| {
            ChainError::Protocol(format!("malformed call history for shard {shard} block {block}"))
        })
    }

    fn call_record(&self, call_index: CallIndex) -> Result<RemoteCall, ChainError> {
        let result = self.rpc("parentchain_callRecord", json!([call_index]))?;
        if result.is_null() {
            return Err(ChainError::Missing(format!("call record {call_index}")));
        }
        let payload = parse_bytes(&result["payload"]).ok_or_else(|| {
            ChainError::Protocol(format!("malformed payload for call {call_index}"))
        })?;
        let origin = parse_string(&result["origin"]).ok_or_else(|| {
            ChainError::Protocol(format!("malformed origin for call {call_index}"))
        })?;
        Ok(RemoteCall { origin, payload })
    }

    fn wasm_blob_ref(&self, contract: &str) -> Result<Option<String>, ChainError> {
        let result = self.rpc("parentchain_wasmBlob", json!([contract]))?;
        Ok(parse_string(&result))
    }

    fn shard_members(&self, shard: ShardId) -> Result<Vec<String>, ChainError> {
        let result = self.rpc("registry_shardMembers", json!([shard]))?;
        parse_string_list(&result)
            .ok_or_else(|| ChainError::Protocol(format!("malformed members of shard {shard}")))
    }

    fn beacon_index(&self, shard: ShardId, account: &str) -> Result<Option<u32>, ChainError> {
        self.query_u32("registry_beaconIndex", json!([shard, account]))
    }

    fn confirmation_threshold(&self, shard: ShardId) -> Result<Option<u32>, ChainError> {
        self.query_u32("parentchain_confirmationThreshold", json!([shard]))
    }

    fn registration_expiration(&self, account: &str) -> Result<Option<BlockNumber>, ChainError> {
        self.query_u32("registry_expiration", json!([account]))
    }

    fn confirmation(&self, shard: ShardId, block: BlockNumber) -> Result<u32, ChainError> {
        Ok(self
            .query_u32("parentchain_confirmation", json!([shard, block]))?
            .unwrap_or(0))
    }

    fn confirmed_outcome(
        &self,
        shard: ShardId,
        call_index: CallIndex,
    ) -> Result<Option<Vec<u8>>, ChainError> {
        let result = self.rpc("parentchain_outcome", json!([shard, call_index]))?;
        Ok(parse_bytes(&result).filter(|bytes| !bytes.is_empty()))
    }

    fn submit(&self, tx: ChainTx) -> Result<(), ChainError> {
        let params = json!({ "signer": self.signer, "tx": tx_params(&tx) });
        self.rpc("author_submitTransaction", params)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash256;

    #[test]
    fn rpc_response_with_error_deserializes() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"bad origin"}}"#;
        let resp: RpcResponse = serde_json::from_str(body).expect("RpcResponse should parse");
        assert!(resp.result.is_null());
        let err = resp.error.expect("error body");
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "bad origin");
    }

    #[test]
    fn submit_outcome_descriptor_is_hex_encoded() {
        let tx = ChainTx::SubmitOutcome {
            block_number: 12,
            shard_id: 0,
            state_root: Hash256([0xAB; 32]),
            call_indexes: vec![3, 4],
            outcomes: vec![vec![1, 2], Vec::new()],
        };
        let params = tx_params(&tx);
        assert_eq!(params["method"], "submit_outcome");
        assert_eq!(params["args"]["call_index"], json!([3, 4]));
        assert_eq!(params["args"]["outcomes"], json!(["0x0102", "0x"]));
        assert!(
            params["args"]["state_root"]
                .as_str()
                .is_some_and(|s| s.starts_with("0xabab"))
        );
    }

    #[test]
    fn batch_descriptor_nests_inner_calls() {
        let tx = ChainTx::Batch(vec![
            ChainTx::RegisterRunningShard { shard_id: 1 },
            ChainTx::PushCall {
                shard_id: 1,
                calls: vec![0xFF],
            },
        ]);
        let params = tx_params(&tx);
        assert_eq!(params["method"], "batch");
        assert_eq!(params["args"]["calls"][0]["method"], "register_running_shard");
        assert_eq!(params["args"]["calls"][1]["args"]["calls"], "0xff");
    }
}
