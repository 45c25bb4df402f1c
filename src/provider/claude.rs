use super::{command_for, run_piped, ProviderOutput, Runner};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct ClaudeRunner {
    pub binary: PathBuf,
    pub model: String,
    pub tools: Vec<String>,
    pub permission_mode: String,
}

#[async_trait]
impl Runner for ClaudeRunner {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn execute(
        &self,
        prompt: &str,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<ProviderOutput, ProviderError> {
        let mut cmd = command_for(&self.binary);

        // Ensure subscription auth is used (not API key)
        cmd.env_remove("ANTHROPIC_API_KEY");

        // Prompt arrives on stdin
        cmd.arg("-p")
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("json")
            .arg("--allowedTools")
            .arg(self.tools.join(","))
            .arg("--permission-mode")
            .arg(&self.permission_mode);

        let mut output = run_piped(cmd, prompt, workdir, timeout).await?;
        output.stdout = unwrap_result(&output.stdout);
        Ok(output)
    }
}

/// Claude wraps the answer in {"result": "...", ...}; fall back to raw text.
fn unwrap_result(stdout: &str) -> String {
    #[derive(Deserialize)]
    struct ClaudeOutput {
        result: String,
    }

    match serde_json::from_str::<ClaudeOutput>(stdout.trim()) {
        Ok(out) => out.result.trim().to_string(),
        Err(_) => stdout.trim().to_string(),
    }
}
