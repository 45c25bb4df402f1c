use super::{command_for, run_piped, ProviderOutput, Runner};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct GeminiRunner {
    pub binary: PathBuf,
    pub model: String,
}

#[async_trait]
impl Runner for GeminiRunner {
    fn name(&self) -> &'static str {
        "gemini_cli"
    }

    async fn execute(
        &self,
        prompt: &str,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<ProviderOutput, ProviderError> {
        let mut cmd = command_for(&self.binary);
        cmd.arg("--yolo").arg("--model").arg(&self.model);

        let mut output = run_piped(cmd, prompt, workdir, timeout).await?;
        output.stdout = output.stdout.trim().to_string();
        Ok(output)
    }
}
