use super::{command_for, run_piped, ProviderOutput, Runner};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub struct CodexRunner {
    pub binary: PathBuf,
    pub model: String,
    pub reasoning_effort: Option<String>,
}

#[async_trait]
impl Runner for CodexRunner {
    fn name(&self) -> &'static str {
        "codex_cli"
    }

    async fn execute(
        &self,
        prompt: &str,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<ProviderOutput, ProviderError> {
        // Final assistant message lands here; stdout also carries progress noise
        let last_message = NamedTempFile::new()?;

        let mut cmd = command_for(&self.binary);
        cmd.arg("--yolo").arg("--search");
        if let Some(effort) = &self.reasoning_effort {
            cmd.arg("--config")
                .arg(format!("model_reasoning_effort={}", effort));
        }
        cmd.arg("exec")
            .arg("--model")
            .arg(&self.model)
            .arg("--output-last-message")
            .arg(last_message.path())
            // Read prompt from stdin
            .arg("-");

        let mut output = run_piped(cmd, prompt, workdir, timeout).await?;

        let message = std::fs::read_to_string(last_message.path()).unwrap_or_default();
        if !message.trim().is_empty() {
            output.stdout = message;
        }
        output.stdout = output.stdout.trim().to_string();

        Ok(output)
    }
}
