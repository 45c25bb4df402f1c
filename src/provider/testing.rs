//! In-process agent backend for tests.

use super::{ProviderOutput, Runner};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Exit(i32),
    Timeout,
    /// Never answers
    Stall,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

type Handler = Box<dyn Fn(&str) -> Reply + Send + Sync>;

/// Replays queued replies (or asks a handler) and records every prompt.
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<Reply>>,
    handler: Option<Handler>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            handler: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler(handler: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, idx: usize) -> String {
        self.prompts.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        prompt: &str,
        _workdir: &Path,
        timeout: Duration,
    ) -> Result<ProviderOutput, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let reply = match &self.handler {
            Some(handler) => handler(prompt),
            None => self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Exit(1)),
        };

        match reply {
            Reply::Text(stdout) => Ok(ProviderOutput {
                stdout,
                stderr: String::new(),
                duration: Duration::ZERO,
                exit_code: 0,
            }),
            Reply::Exit(code) => Err(ProviderError::NonZeroExit {
                code,
                stderr: format!("scripted failure {}", code),
            }),
            Reply::Timeout => Err(ProviderError::Timeout(timeout)),
            Reply::Stall => std::future::pending().await,
        }
    }
}
