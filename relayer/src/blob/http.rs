//! Blob store backed by IPFS-style HTTP gateways.
//!
//! - `add`: `POST {gateway}/api/v0/add` with a multipart `file` field,
//!   answered with `{"Hash": "<id>", ...}`.
//! - `get`: `POST {gateway}/api/v0/cat?arg=<id>`, answered with the raw
//!   bytes.
//!
//! Each attempt walks the gateways in order and stops at the first
//! success; attempts are repeated according to the injected
//! [`RetryPolicy`].

use std::time::Duration;

use reqwest::blocking::{Client, multipart};
use serde::Deserialize;

use super::{BlobConfig, BlobError, BlobStore};
use crate::retry::RetryPolicy;

pub struct GatewayBlobStore {
    gateways: Vec<String>,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl GatewayBlobStore {
    pub fn new(cfg: &BlobConfig) -> Result<Self, BlobError> {
        if cfg.gateways.is_empty() {
            return Err(BlobError::NoGateways);
        }
        Ok(Self {
            gateways: cfg
                .gateways
                .iter()
                .map(|g| g.trim_end_matches('/').to_string())
                .collect(),
            client: build_client(cfg.timeout)?,
            retry: cfg.retry,
        })
    }

    /// Runs `op` against each gateway in order until one succeeds.
    fn first_success<T>(
        &self,
        mut op: impl FnMut(&str) -> Result<T, BlobError>,
    ) -> Result<T, BlobError> {
        let mut last = BlobError::NoGateways;
        for gateway in &self.gateways {
            match op(gateway) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!(gateway = %gateway, error = %e, "blob gateway failed");
                    last = e;
                }
            }
        }
        Err(match last {
            BlobError::NotFound(id) => BlobError::NotFound(id),
            other => BlobError::Unavailable(other.to_string()),
        })
    }

    fn add_via(&self, gateway: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let form =
            multipart::Form::new().part("file", multipart::Part::bytes(bytes.to_vec()).file_name("blob"));
        let resp = self
            .client
            .post(format!("{gateway}/api/v0/add"))
            .multipart(form)
            .send()
            .map_err(|e| BlobError::Unavailable(format!("{gateway}: {e}")))?;
        if !resp.status().is_success() {
            return Err(BlobError::Unavailable(format!(
                "{gateway}: HTTP status {}",
                resp.status()
            )));
        }
        let body = resp
            .json::<AddResponse>()
            .map_err(|e| BlobError::Protocol(format!("{gateway}: {e}")))?;
        Ok(body.hash)
    }

    fn get_via(&self, gateway: &str, id: &str) -> Result<Vec<u8>, BlobError> {
        let resp = self
            .client
            .post(format!("{gateway}/api/v0/cat"))
            .query(&[("arg", id)])
            .send()
            .map_err(|e| BlobError::Unavailable(format!("{gateway}: {e}")))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(BlobError::Unavailable(format!("{gateway}: HTTP status {status}")));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| BlobError::Unavailable(format!("{gateway}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

fn build_client(timeout: Duration) -> Result<Client, BlobError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BlobError::Unavailable(format!("failed to build HTTP client: {e}")))
}

impl BlobStore for GatewayBlobStore {
    fn add(&self, bytes: &[u8]) -> Result<String, BlobError> {
        self.retry
            .run("blob add", |_| self.first_success(|gw| self.add_via(gw, bytes)))
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, BlobError> {
        self.retry
            .run("blob get", |_| self.first_success(|gw| self.get_via(gw, id)))
    }
}
