//! HTTP transport for the execution engine.
//!
//! ```text
//! POST /call
//! Content-Type: application/x-www-form-urlencoded
//!
//! payload=<hex framed calls>&state_root=<hex prior root>
//!
//! 200 OK
//! <hex framed outcomes>
//! ```

use std::time::Duration;

use reqwest::blocking::Client;

use super::{EngineError, ExecutionEngine, decode_hex_output};
use crate::types::Hash256;

/// Execution engine reached over HTTP.
pub struct HttpEngine {
    base_url: String,
    client: Client,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl ExecutionEngine for HttpEngine {
    fn execute(&self, payload: &[u8], prior_root: &Hash256) -> Result<Vec<u8>, EngineError> {
        let url = self.endpoint("/call");
        let form = [
            ("payload", hex::encode(payload)),
            ("state_root", prior_root.to_hex()),
        ];

        let resp = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| EngineError::Unreachable(format!("HTTP POST {url} failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| EngineError::MalformedOutput(format!("unreadable body: {e}")))?;
        if !status.is_success() {
            return Err(EngineError::Failed(format!(
                "engine returned HTTP status {status}: {}",
                body.trim()
            )));
        }
        decode_hex_output(&body)
    }
}
