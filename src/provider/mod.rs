mod claude;
mod codex;
mod gemini;
#[cfg(test)]
pub mod testing;

pub use claude::ClaudeRunner;
pub use codex::CodexRunner;
pub use gemini::GeminiRunner;

use crate::config::{AgentConfig, Family, ProvidersConfig};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

#[derive(Debug)]
pub struct ProviderOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub exit_code: i32,
}

/// An external agent process bound to one model configuration.
#[async_trait]
pub trait Runner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one prompt in `workdir`. Fails on non-zero exit or timeout.
    async fn execute(
        &self,
        prompt: &str,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<ProviderOutput, ProviderError>;
}

/// Create the backend for an agent's family and model
pub fn create_runner(providers: &ProvidersConfig, agent: &AgentConfig) -> Arc<dyn Runner> {
    match agent.family {
        Family::Codex => Arc::new(CodexRunner {
            binary: providers.codex_cli.binary.clone(),
            model: agent.model.clone(),
            reasoning_effort: agent.reasoning_effort.clone(),
        }),
        Family::Gemini => Arc::new(GeminiRunner {
            binary: providers.gemini_cli.binary.clone(),
            model: agent.model.clone(),
        }),
        Family::Claude => Arc::new(ClaudeRunner {
            binary: providers.claude_cli.binary.clone(),
            model: agent.model.clone(),
            tools: providers.claude_cli.tools.clone(),
            permission_mode: providers.claude_cli.permission_mode.clone(),
        }),
    }
}

/// Build a command, using PATH lookup unless `binary` looks like a path
fn command_for(binary: &Path) -> Command {
    let binary_str = binary.to_string_lossy();
    if binary_str.contains('/') || binary_str.contains('\\') {
        Command::new(binary)
    } else {
        Command::new(binary_str.as_ref())
    }
}

/// Spawn `cmd` in `workdir`, feed `prompt` on stdin and collect its output.
///
/// The child is killed if the timeout elapses.
async fn run_piped(
    mut cmd: Command,
    prompt: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<ProviderOutput, ProviderError> {
    cmd.current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = std::time::Instant::now();
    let mut child = cmd.spawn()?;
    let stdin = child.stdin.take();
    let input = prompt.as_bytes().to_vec();

    let run = async move {
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        if let Err(e) = written {
            // The exit status decides; a child may legitimately stop reading early.
            debug!("Failed to write prompt to agent stdin: {}", e);
        }
        output
    };

    let output = tokio_timeout(timeout, run)
        .await
        .map_err(|_| ProviderError::Timeout(timeout))??;

    let result = ProviderOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration: start.elapsed(),
        exit_code: output.status.code().unwrap_or(-1),
    };

    if !output.status.success() {
        return Err(ProviderError::NonZeroExit {
            code: result.exit_code,
            stderr: result.stderr,
        });
    }

    Ok(result)
}
