mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            subject: default_subject(),
            workdir: default_workdir(),
            task: default_task(),
            context_mode: ContextMode::default(),
            cached: false,
            agents: Vec::new(),
            arbiter: ArbiterConfig::default(),
            max_queries: default_max_queries(),
            include_low_priority: false,
            output_lang: OutputLang::default(),
            timeout_sec: default_timeout_sec(),
            retry: RetryConfig::default(),
            copy_excludes: Vec::new(),
            progress_interval_sec: default_progress_interval_sec(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file if it exists. A missing file is only an error
    /// when the user pointed at it explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        if explicit || path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reviewer roster: configured agents (or the built-in defaults) minus
    /// any entry reserved for the arbiter.
    pub fn reviewers(&self) -> Vec<AgentConfig> {
        let configured = if self.agents.is_empty() {
            default_agents()
        } else {
            self.agents.clone()
        };
        let configured: Vec<AgentConfig> =
            configured.into_iter().map(AgentConfig::normalized).collect();
        let arbiter = self.arbiter.resolve(&configured);

        configured
            .into_iter()
            .filter(|reviewer| {
                let reserved = self.arbiter.reserves(&arbiter, reviewer);
                if reserved {
                    warn!(
                        "Ignoring {} as a reviewer because it is reserved for the arbiter",
                        reviewer.display_name()
                    );
                }
                !reserved
            })
            .collect()
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reviewers = self.reviewers();
        if reviewers.is_empty() {
            return Err(ConfigError::NoAgents);
        }

        let arbiter = self.arbiter.resolve(&reviewers);
        let mut seen = HashSet::new();
        for name in reviewers
            .iter()
            .chain(std::iter::once(&arbiter))
            .map(AgentConfig::display_name)
        {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateAgent(name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_spec() {
        let agent: AgentConfig = "codex:gpt-5.1:xhigh".parse().unwrap();
        assert_eq!(agent.family, Family::Codex);
        assert_eq!(agent.model, "gpt-5.1");
        assert_eq!(agent.reasoning_effort.as_deref(), Some("xhigh"));
        assert_eq!(agent.display_name(), "Codex[gpt-5.1|xhigh]");

        let agent: AgentConfig = "codex:gpt-5.1".parse().unwrap();
        assert_eq!(agent.reasoning_effort.as_deref(), Some("high"));

        let agent: AgentConfig = "gemini:gemini-3-pro-preview".parse().unwrap();
        assert_eq!(agent.display_name(), "Gemini[gemini-3-pro-preview]");

        assert!("codex".parse::<AgentConfig>().is_err());
        assert!("mystery:model".parse::<AgentConfig>().is_err());
    }

    #[test]
    fn test_default_roster_and_arbiter() {
        let config = Config::default();
        let reviewers = config.reviewers();
        assert_eq!(reviewers.len(), 3);

        let arbiter = config.arbiter.resolve(&reviewers);
        assert_eq!(arbiter.display_name(), "Arbiter[Codex[gpt-5.1-codex|low]]");
        config.validate().unwrap();
    }

    #[test]
    fn test_reserved_arbiter_model_is_not_a_reviewer() {
        let config = Config {
            agents: vec![
                "codex:gpt-5.1-codex:low".parse().unwrap(),
                "gemini:gemini-3-pro-preview".parse().unwrap(),
            ],
            ..Config::default()
        };
        let reviewers = config.reviewers();
        assert_eq!(reviewers.len(), 1);
        assert_eq!(reviewers[0].family, Family::Gemini);
    }

    #[test]
    fn test_gemini_arbiter_follows_reviewer_model() {
        let config = Config {
            agents: vec!["gemini:gemini-2.5-pro".parse().unwrap()],
            arbiter: ArbiterConfig {
                family: Family::Gemini,
                ..ArbiterConfig::default()
            },
            ..Config::default()
        };
        let arbiter = config.arbiter.resolve(&config.reviewers());
        assert_eq!(arbiter.model, "gemini-2.5-pro");
        assert_eq!(arbiter.display_name(), "Arbiter[Gemini[gemini-2.5-pro]]");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = Config {
            agents: vec![
                "codex:gpt-5.1:high".parse().unwrap(),
                "codex:gpt-5.1:high".parse().unwrap(),
            ],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateAgent(name)) if name == "Codex[gpt-5.1|high]"
        ));
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
agents:
  - family: claude
    model: opus
arbiter:
  family: claude
  mode: multi
max_queries: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeout_sec, 3600);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.arbiter.mode, ArbiterMode::Multi);
        assert_eq!(config.max_queries, 3);
        assert_eq!(config.workdir, std::path::PathBuf::from(".crossrev"));
        config.validate().unwrap();
    }
}
