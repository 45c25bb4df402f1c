pub mod clean;
pub mod run;
pub mod schema;

use crate::config::{ArbiterMode, ContextMode, Family, OutputLang};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crossrev")]
#[command(
    author,
    version,
    about = "Cross-checked code review by several AI agents and one arbiter"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging (prompts included)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a review and print the unified report on stdout
    Run(RunArgs),

    /// Remove run directories left behind by interrupted runs
    Clean(CleanArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Path to config file (optional unless given explicitly)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root of the codebase under review
    #[arg(long)]
    pub subject: Option<PathBuf>,

    /// What the reviewers should focus on
    #[arg(long)]
    pub task: Option<String>,

    #[arg(long, value_enum)]
    pub context_mode: Option<ContextMode>,

    /// Review staged changes only (diff mode)
    #[arg(long)]
    pub cached: bool,

    /// Reviewer as family:model[:effort]; repeatable, replaces the configured roster
    #[arg(long = "agent", value_name = "SPEC")]
    pub agents: Vec<String>,

    #[arg(long, value_enum)]
    pub arbiter_family: Option<Family>,

    #[arg(long)]
    pub arbiter_model: Option<String>,

    #[arg(long, value_enum)]
    pub arbiter_mode: Option<ArbiterMode>,

    /// Clarification question budget in multi mode
    #[arg(long)]
    pub max_queries: Option<usize>,

    /// Root for run directories and memos; must be inside the subject
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Keep P2/P3 items in the final report
    #[arg(long)]
    pub include_low_priority: bool,

    #[arg(long, value_enum)]
    pub output_lang: Option<OutputLang>,

    /// Per-call agent timeout in seconds
    #[arg(long, env = "CROSSREV_TIMEOUT_SEC")]
    pub timeout_sec: Option<u64>,

    /// Extra comma-separated basename patterns to skip when copying
    #[arg(long, env = "CROSSREV_COPY_EXCLUDES", value_delimiter = ',')]
    pub copy_excludes: Vec<String>,

    /// Show the plan without calling any agent
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone)]
pub struct CleanArgs {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub subject: Option<PathBuf>,

    #[arg(long)]
    pub workdir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::parse_from([
            "crossrev",
            "run",
            "--agent",
            "codex:gpt-5.1:high",
            "--agent",
            "gemini:gemini-3-pro-preview",
            "--arbiter-mode",
            "multi",
            "--max-queries",
            "7",
            "--context-mode",
            "diff",
            "--cached",
            "-v",
        ]);
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.agents.len(), 2);
        assert_eq!(args.arbiter_mode, Some(ArbiterMode::Multi));
        assert_eq!(args.max_queries, Some(7));
        assert_eq!(args.context_mode, Some(ContextMode::Diff));
        assert!(args.cached);
    }
}
