//! Clients for the out-of-process execution engine.
//!
//! The engine is a pure function of `(framed call batch, prior state
//! root)` returning a framed outcome batch. It keeps no state between
//! invocations, so re-running a batch after a crash is safe. Two
//! transports are provided: [`http::HttpEngine`] and
//! [`process::ProcessEngine`].

pub mod http;
pub mod process;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Hash256;

pub use http::HttpEngine;
pub use process::ProcessEngine;

/// Errors surfaced by an [`ExecutionEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached or started.
    #[error("engine unreachable: {0}")]
    Unreachable(String),
    /// The engine ran but reported a failure.
    #[error("engine failed: {0}")]
    Failed(String),
    /// The engine answered with bytes that are not a valid outcome batch.
    #[error("malformed engine output: {0}")]
    MalformedOutput(String),
}

/// Deterministic execution engine.
pub trait ExecutionEngine: Send + Sync {
    /// Executes a framed call batch on top of `prior_root`.
    fn execute(&self, payload: &[u8], prior_root: &Hash256) -> Result<Vec<u8>, EngineError>;
}

/// How to reach the execution engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineTransport {
    /// `POST {endpoint}/call`.
    Http { endpoint: String },
    /// Run `program` once per batch.
    Process { program: PathBuf, args: Vec<String> },
}

/// Configuration for the execution engine client.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub transport: EngineTransport,
    /// Timeout of one HTTP invocation. Subprocesses run to completion.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: EngineTransport::Http {
                endpoint: "http://127.0.0.1:8090".to_string(),
            },
            timeout: Duration::from_secs(60),
        }
    }
}

/// Builds the engine client described by `cfg`.
pub fn connect(cfg: &EngineConfig) -> Result<Box<dyn ExecutionEngine>, EngineError> {
    Ok(match &cfg.transport {
        EngineTransport::Http { endpoint } => Box::new(HttpEngine::new(endpoint, cfg.timeout)?),
        EngineTransport::Process { program, args } => {
            Box::new(ProcessEngine::new(program.clone(), args.clone()))
        }
    })
}

/// Decodes a hex answer, tolerating surrounding whitespace and a `0x`.
pub(crate) fn decode_hex_output(text: &str) -> Result<Vec<u8>, EngineError> {
    let text = text.trim();
    let text = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(text).map_err(|e| EngineError::MalformedOutput(format!("invalid hex: {e}")))
}
