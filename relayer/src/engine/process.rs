//! Subprocess transport for the execution engine.
//!
//! The engine binary is invoked once per batch as
//! `<program> [args..] --state-root <hex> --params <hex>` and prints the
//! hex-encoded outcome batch on stdout.

use std::path::PathBuf;
use std::process::Command;

use super::{EngineError, ExecutionEngine, decode_hex_output};
use crate::types::Hash256;

/// Execution engine run as a child process.
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn command(&self, payload: &[u8], prior_root: &Hash256) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--state-root")
            .arg(prior_root.to_hex())
            .arg("--params")
            .arg(hex::encode(payload));
        cmd
    }
}

impl ExecutionEngine for ProcessEngine {
    fn execute(&self, payload: &[u8], prior_root: &Hash256) -> Result<Vec<u8>, EngineError> {
        let output = self.command(payload, prior_root).output().map_err(|e| {
            EngineError::Unreachable(format!("failed to start {}: {e}", self.program.display()))
        })?;

        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| EngineError::MalformedOutput(format!("stdout is not UTF-8: {e}")))?;
        decode_hex_output(&stdout)
    }
}
