//! Durable per-agent memos.
//!
//! A memo outlives the run directory: it lives under `<workdir>/memos/<slug>/`
//! and is changed only through a `MEMO_JSON:` trailer the agent emits in
//! its own response.

use crate::agent::{slug, Agent};
use crate::error::ProtocolError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const MEMO_JSON_PREFIX: &str = "MEMO_JSON:";
const MEMO_FILE: &str = "memo.txt";

/// Locates memo directories for agents under a persistent root.
#[derive(Debug, Clone)]
pub struct MemoStore {
    root: PathBuf,
}

impl MemoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Memo directory for an agent display name
    pub fn dir_for(&self, name: &str) -> PathBuf {
        self.root.join(slug(name))
    }
}

fn memo_path(dir: &Path) -> PathBuf {
    dir.join(MEMO_FILE)
}

/// Load an agent's memo. Absent or unreadable memos read as empty.
pub fn load(agent: &Agent) -> String {
    fs::read_to_string(memo_path(&agent.memo_dir)).unwrap_or_default()
}

/// Overwrite an agent's memo, creating parent directories as needed.
pub fn save(agent: &Agent, text: &str) -> std::io::Result<()> {
    fs::create_dir_all(&agent.memo_dir)?;
    fs::write(memo_path(&agent.memo_dir), text)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemoDirective {
    #[serde(default)]
    pub append: String,
    #[serde(default)]
    pub overwrite: bool,
}

impl MemoDirective {
    /// Apply this directive to the current memo text
    pub fn apply(&self, current: &str) -> String {
        if self.overwrite {
            return self.append.clone();
        }
        if self.append.is_empty() {
            return current.to_string();
        }
        let mut memo = current.to_string();
        if !memo.is_empty() && !memo.ends_with('\n') {
            memo.push('\n');
        }
        memo.push_str(&self.append);
        memo
    }
}

/// Response text with the memo trailer removed.
#[derive(Debug)]
pub struct Extracted {
    pub text: String,
    pub directive: Option<Result<MemoDirective, serde_json::Error>>,
}

/// Strip every `MEMO_JSON:` line from `raw`. The last one is the directive.
pub fn extract(raw: &str) -> Extracted {
    let mut kept = Vec::new();
    let mut directives = Vec::new();

    for line in raw.lines() {
        match line.trim().strip_prefix(MEMO_JSON_PREFIX) {
            Some(json) => directives.push(json.trim().to_string()),
            None => kept.push(line),
        }
    }

    if directives.len() > 1 {
        debug!(
            "{} MEMO_JSON lines found, only the last one is applied",
            directives.len()
        );
    }

    Extracted {
        text: kept.join("\n").trim().to_string(),
        directive: directives
            .pop()
            .map(|json| serde_json::from_str::<MemoDirective>(&json)),
    }
}

/// Strip the memo trailer from an agent response and write through any
/// memo update it requests. Returns the visible text.
pub fn process_response(agent: &Agent, raw: &str) -> String {
    let extracted = extract(raw);

    match extracted.directive {
        Some(Ok(directive)) => {
            let before = load(agent);
            let after = directive.apply(&before);
            if after != before {
                match save(agent, &after) {
                    Ok(()) => debug!("Updated memo for {} ({} bytes)", agent.name, after.len()),
                    Err(e) => warn!("Failed to write memo for {}: {}", agent.name, e),
                }
            }
        }
        Some(Err(source)) => {
            let err = ProtocolError::MemoDirective {
                agent: agent.name.clone(),
                source,
            };
            warn!("{}", err);
        }
        None => {}
    }

    extracted.text
}
