use crate::agent::Agent;
use crate::config::RetryConfig;
use crate::error::{InvocationError, ProviderError};
use crate::memo;
use std::time::Duration;
use tracing::debug;

use super::retry::{retry_with_backoff, RetryFailure};

/// Bounded, retried calls to an agent's external process.
#[derive(Debug, Clone)]
pub struct Invoker {
    timeout: Duration,
    retry: RetryConfig,
}

impl Invoker {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    /// Run `prompt` through the agent's backend in its workspace.
    ///
    /// Timeouts fail at once; other failures are retried up to the
    /// configured attempt count.
    pub async fn call(&self, agent: &Agent, prompt: &str) -> Result<String, InvocationError> {
        debug!(
            "==== PROMPT BEGIN [{}] ====\n{}\n==== PROMPT END [{}] ====",
            agent.name, prompt, agent.name
        );

        let result = retry_with_backoff(&self.retry, |e: &ProviderError| !e.is_timeout(), || {
            agent.backend.execute(prompt, &agent.workdir, self.timeout)
        })
        .await;

        match result {
            Ok(output) => {
                debug!(
                    "{} ({}) answered in {:?}",
                    agent.name,
                    agent.backend.name(),
                    output.duration
                );
                Ok(output.stdout)
            }
            Err(RetryFailure {
                error: ProviderError::Timeout(timeout),
                ..
            }) => Err(InvocationError::TimedOut {
                agent: agent.name.clone(),
                timeout,
            }),
            Err(RetryFailure { attempts, error }) => Err(InvocationError::Exhausted {
                agent: agent.name.clone(),
                attempts,
                source: error,
            }),
        }
    }

    /// [`Invoker::call`] followed by memo trailer handling. Returns the
    /// visible response text.
    pub async fn invoke(&self, agent: &Agent, prompt: &str) -> Result<String, InvocationError> {
        let raw = self.call(agent, prompt).await?;
        Ok(memo::process_response(agent, &raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Family;
    use crate::memo::MemoStore;
    use crate::provider::testing::{Reply, ScriptedRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn invoker() -> Invoker {
        Invoker::new(
            Duration::from_secs(5),
            RetryConfig {
                max_attempts: 4,
                backoff_base_ms: 1,
            },
        )
    }

    fn agent(dir: &TempDir, runner: Arc<ScriptedRunner>) -> Agent {
        Agent {
            name: "Gemini[test]".to_string(),
            family: Family::Gemini,
            model: "test".to_string(),
            workdir: dir.path().to_path_buf(),
            memo_dir: MemoStore::new(dir.path().join("memos")).dir_for("Gemini[test]"),
            backend: runner,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_fourth_attempt() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![
            Reply::Exit(1),
            Reply::Exit(1),
            Reply::Exit(2),
            Reply::text("finally"),
        ]));
        let agent = agent(&dir, runner.clone());

        let out = invoker().call(&agent, "prompt").await.unwrap();
        assert_eq!(out, "finally");
        assert_eq!(runner.calls(), 4);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_four_attempts() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![Reply::Exit(1); 5]));
        let agent = agent(&dir, runner.clone());

        let err = invoker().call(&agent, "prompt").await.unwrap_err();
        assert!(matches!(err, InvocationError::Exhausted { attempts: 4, .. }));
        assert!(err.to_string().contains("4 attempts"));
        assert_eq!(runner.calls(), 4);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![
            Reply::Timeout,
            Reply::text("never reached"),
        ]));
        let agent = agent(&dir, runner.clone());

        let err = invoker().call(&agent, "prompt").await.unwrap_err();
        assert!(matches!(err, InvocationError::TimedOut { .. }));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_invoke_updates_memo_and_strips_trailer() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![Reply::text(
            "## Review\nLooks fine\nMEMO_JSON: {\"append\": \"checked auth module\"}",
        )]));
        let agent = agent(&dir, runner);

        let out = invoker().invoke(&agent, "prompt").await.unwrap();
        assert_eq!(out, "## Review\nLooks fine");
        assert_eq!(memo::load(&agent), "checked auth module");
    }
}
