use std::path::PathBuf;

use super::{AgentConfig, Family};

pub fn default_version() -> u32 {
    1
}

pub fn default_subject() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_workdir() -> PathBuf {
    PathBuf::from(".crossrev")
}

pub fn default_task() -> String {
    "Please review this code context for correctness, readability, and potential issues."
        .to_string()
}

pub fn default_max_queries() -> usize {
    50
}

pub fn default_timeout_sec() -> u64 {
    3600
}

pub fn default_progress_interval_sec() -> u64 {
    5
}

pub fn default_max_attempts() -> u32 {
    4
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_reasoning_effort() -> String {
    "high".to_string()
}

pub fn default_arbiter_family() -> Family {
    Family::Codex
}

pub fn default_codex_arbiter_model() -> String {
    "gpt-5.1-codex".to_string()
}

pub fn default_codex_arbiter_effort() -> String {
    "low".to_string()
}

pub fn default_codex_model() -> String {
    "gpt-5.1".to_string()
}

pub fn default_gemini_model() -> String {
    "gemini-3-pro-preview".to_string()
}

pub fn default_claude_model() -> String {
    "sonnet".to_string()
}

/// Reviewers used when neither the config file nor the CLI names any
pub fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            family: Family::Codex,
            model: "gpt-5.1".to_string(),
            reasoning_effort: Some("high".to_string()),
            name: None,
        },
        AgentConfig {
            family: Family::Codex,
            model: "gpt-5.1-codex-max".to_string(),
            reasoning_effort: Some("xhigh".to_string()),
            name: None,
        },
        AgentConfig {
            family: Family::Gemini,
            model: default_gemini_model(),
            reasoning_effort: None,
            name: None,
        },
    ]
}

pub fn default_codex_binary() -> PathBuf {
    PathBuf::from("codex")
}

pub fn default_gemini_binary() -> PathBuf {
    PathBuf::from("gemini")
}

pub fn default_claude_binary() -> PathBuf {
    // Check common install location first
    if let Some(home) = std::env::var_os("HOME") {
        let local_path = PathBuf::from(home).join(".claude/local/claude");
        if local_path.exists() {
            return local_path;
        }
    }
    // Fall back to PATH lookup
    PathBuf::from("claude")
}

pub fn default_claude_tools() -> Vec<String> {
    vec!["Read".to_string(), "Grep".to_string(), "Glob".to_string()]
}

pub fn default_permission_mode() -> String {
    "acceptEdits".to_string()
}
