//! Diagram generation through a locally installed `codex` CLI.
//!
//! The prompt pair is piped to `codex exec` on stdin and the reply is read
//! from stdout. Useful on machines with CLI credentials but no raw API key.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::provider::{DiagramProvider, ProviderError};

const BINARY: &str = "codex";

pub struct CodexCliProvider {
    model: String,
    timeout_ms: u64,
}

impl CodexCliProvider {
    pub fn new(model: String, timeout_ms: u64) -> Self {
        Self { model, timeout_ms }
    }
}

#[async_trait]
impl DiagramProvider for CodexCliProvider {
    fn name(&self) -> &str {
        "codex_cli"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        debug!(model = %self.model, "invoking codex CLI");

        let mut child = Command::new(BINARY)
            .arg("exec")
            .arg("--model")
            .arg(&self.model)
            .arg("--quiet")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Unavailable(format!("failed to spawn {BINARY}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = format!("{system}\n\n{user}");
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Unavailable(format!("stdin write failed: {e}")))?;
        }

        let output = tokio::time::timeout(
            std::time::Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            ms: self.timeout_ms,
        })?
        .map_err(|e| ProviderError::Unavailable(format!("{BINARY} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), "codex CLI exited non-zero");
            return Err(ProviderError::Api {
                status: output.status.code().unwrap_or(-1).unsigned_abs() as u16,
                message: stderr.into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(ProviderError::Parse("empty CLI output".to_string()));
        }
        Ok(stdout)
    }

    async fn preflight(&self) -> Result<(), ProviderError> {
        which::which(BINARY)
            .map(|_| ())
            .map_err(|_| ProviderError::Unavailable(format!("{BINARY} not found on PATH")))
    }
}
