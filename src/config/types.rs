use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root of the codebase under review
    #[serde(default = "default_subject")]
    pub subject: PathBuf,

    /// Root for run directories and memos. Relative paths resolve against
    /// `subject` and must stay inside it.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    #[serde(default = "default_task")]
    pub task: String,

    #[serde(default)]
    pub context_mode: ContextMode,

    /// Review staged changes (`git diff --cached`) in diff mode
    #[serde(default)]
    pub cached: bool,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub arbiter: ArbiterConfig,

    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Keep itemized P2/P3 entries in the final report
    #[serde(default)]
    pub include_low_priority: bool,

    #[serde(default)]
    pub output_lang: OutputLang,

    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Extra basename patterns skipped when copying a non-git subject
    #[serde(default)]
    pub copy_excludes: Vec<String>,

    #[serde(default = "default_progress_interval_sec")]
    pub progress_interval_sec: u64,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AgentConfig {
    pub family: Family,

    pub model: String,

    #[serde(default)]
    pub reasoning_effort: Option<String>,

    /// Display name override. Defaults to e.g. `Codex[gpt-5.1|high]`.
    #[serde(default)]
    pub name: Option<String>,
}

impl AgentConfig {
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (&self.family, &self.reasoning_effort) {
            (Family::Codex, Some(effort)) => format!("Codex[{}|{}]", self.model, effort),
            (family, _) => format!("{}[{}]", family.label(), self.model),
        }
    }

    /// Codex needs an explicit effort; fill in the default when omitted.
    pub fn normalized(mut self) -> Self {
        if self.family == Family::Codex && self.reasoning_effort.is_none() {
            self.reasoning_effort = Some(default_reasoning_effort());
        }
        self
    }

    fn same_model(&self, other: &AgentConfig) -> bool {
        self.family == other.family
            && self.model == other.model
            && self.reasoning_effort == other.reasoning_effort
    }
}

impl std::str::FromStr for AgentConfig {
    type Err = ConfigError;

    /// Parse `family:model[:effort]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let family = parts.next().unwrap_or_default();
        let model = parts
            .next()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ConfigError::AgentSpec(s.to_string()))?;
        let effort = parts.next().filter(|e| !e.is_empty()).map(str::to_string);

        Ok(AgentConfig {
            family: family.parse()?,
            model: model.to_string(),
            reasoning_effort: effort,
            name: None,
        }
        .normalized())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ArbiterConfig {
    #[serde(default = "default_arbiter_family")]
    pub family: Family,

    /// Defaults per family: a dedicated low-effort Codex model, the first
    /// configured reviewer's model for Gemini/Claude.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub reasoning_effort: Option<String>,

    #[serde(default)]
    pub mode: ArbiterMode,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            family: default_arbiter_family(),
            model: None,
            reasoning_effort: None,
            mode: ArbiterMode::default(),
        }
    }
}

impl ArbiterConfig {
    /// Resolve the arbiter's model configuration against the reviewer roster.
    pub fn resolve(&self, reviewers: &[AgentConfig]) -> AgentConfig {
        let model = self.model.clone().unwrap_or_else(|| match self.family {
            Family::Codex => default_codex_arbiter_model(),
            family => reviewers
                .iter()
                .find(|a| a.family == family)
                .map(|a| a.model.clone())
                .unwrap_or_else(|| family.default_model()),
        });
        let reasoning_effort = match self.family {
            Family::Codex => Some(
                self.reasoning_effort
                    .clone()
                    .unwrap_or_else(default_codex_arbiter_effort),
            ),
            _ => self.reasoning_effort.clone(),
        };
        let base = AgentConfig {
            family: self.family,
            model,
            reasoning_effort,
            name: None,
        };
        AgentConfig {
            name: Some(format!("Arbiter[{}]", base.display_name())),
            ..base
        }
    }

    /// A reviewer that would run the exact arbiter model is reserved for
    /// the arbiter when the arbiter is Codex.
    pub fn reserves(&self, resolved: &AgentConfig, reviewer: &AgentConfig) -> bool {
        self.family == Family::Codex && resolved.same_model(reviewer)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Codex,
    Gemini,
    Claude,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Codex => "Codex",
            Family::Gemini => "Gemini",
            Family::Claude => "Claude",
        }
    }

    pub fn default_model(&self) -> String {
        match self {
            Family::Codex => default_codex_model(),
            Family::Gemini => default_gemini_model(),
            Family::Claude => default_claude_model(),
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Codex => write!(f, "codex"),
            Family::Gemini => write!(f, "gemini"),
            Family::Claude => write!(f, "claude"),
        }
    }
}

impl std::str::FromStr for Family {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "codex" => Ok(Family::Codex),
            "gemini" => Ok(Family::Gemini),
            "claude" => Ok(Family::Claude),
            _ => Err(ConfigError::UnknownFamily(s.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Agents inspect the repository in their workspace
    #[default]
    Repo,
    /// Agents review the current git diff
    Diff,
    /// Extra context is read from stdin and inlined into prompts
    Stdin,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ArbiterMode {
    /// One arbiter call, no follow-up questions
    #[default]
    Single,
    /// The arbiter may query reviewers up to `max_queries` times
    Multi,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputLang {
    #[default]
    En,
    Zh,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    /// Total attempts per call, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub codex_cli: CodexCliConfig,

    #[serde(default)]
    pub gemini_cli: GeminiCliConfig,

    #[serde(default)]
    pub claude_cli: ClaudeCliConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CodexCliConfig {
    #[serde(default = "default_codex_binary")]
    pub binary: PathBuf,
}

impl Default for CodexCliConfig {
    fn default() -> Self {
        Self {
            binary: default_codex_binary(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GeminiCliConfig {
    #[serde(default = "default_gemini_binary")]
    pub binary: PathBuf,
}

impl Default for GeminiCliConfig {
    fn default() -> Self {
        Self {
            binary: default_gemini_binary(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClaudeCliConfig {
    #[serde(default = "default_claude_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_claude_tools")]
    pub tools: Vec<String>,

    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: default_claude_binary(),
            tools: default_claude_tools(),
            permission_mode: default_permission_mode(),
        }
    }
}
