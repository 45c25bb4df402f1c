use crate::config::{AgentConfig, Family};
use crate::provider::Runner;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

/// One reviewer (or the arbiter) for the duration of a run.
///
/// The family backend is chosen once here; everything downstream calls it
/// through the [`Runner`] trait.
pub struct Agent {
    pub name: String,
    pub family: Family,
    pub model: String,
    /// Private workspace inside the run directory
    pub workdir: PathBuf,
    /// Durable memo location, outside the run directory
    pub memo_dir: PathBuf,
    pub backend: Arc<dyn Runner>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        workdir: PathBuf,
        memo_dir: PathBuf,
        backend: Arc<dyn Runner>,
    ) -> Self {
        Self {
            name: config.display_name(),
            family: config.family,
            model: config.model.clone(),
            workdir,
            memo_dir,
            backend,
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("model", &self.model)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

/// Filesystem-safe, collision-resistant slug for an agent display name.
///
/// Names that sanitize to the same text (`Codex[a|b]` vs `Codex[a b]`)
/// still differ through the hash suffix, and the slug is stable across
/// runs so memos follow the logical agent.
pub fn slug(name: &str) -> String {
    let cleaned = Regex::new(r"[^a-zA-Z0-9._-]+")
        .ok()
        .map(|unsafe_runs| unsafe_runs.replace_all(name, "_").into_owned())
        .unwrap_or_default();
    let cleaned = cleaned.trim_matches('_');
    let base = if cleaned.is_empty() { "agent" } else { cleaned };
    let hash = Sha256::digest(name.as_bytes());
    format!("{}-{}", base, &format!("{:x}", hash)[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_removes_unsafe_chars() {
        let s = slug("Codex[gpt-5.1|high]");
        assert!(s.starts_with("Codex_gpt-5.1_high-"));
        for c in ['[', ']', '|', ' ', '/'] {
            assert!(!s.contains(c));
        }
    }

    #[test]
    fn test_slug_collapses_unsafe_runs() {
        assert!(slug("Claude[opus] / review").starts_with("Claude_opus_review-"));
    }

    #[test]
    fn test_slug_is_stable_and_distinct() {
        assert_eq!(slug("Gemini[x]"), slug("Gemini[x]"));
        assert_ne!(slug("Codex[a|b]"), slug("Codex[a b]"));
    }

    #[test]
    fn test_slug_empty_falls_back() {
        assert!(slug("").starts_with("agent-"));
        assert!(slug("[]|").starts_with("agent-"));
    }
}
