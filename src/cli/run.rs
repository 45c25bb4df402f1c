use crate::cleanup;
use crate::cli::RunArgs;
use crate::config::{AgentConfig, ArbiterMode, Config, ContextMode};
use crate::pipeline::{self, PipelineRequest};
use anyhow::Context;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "crossrev.yaml";

/// Conventional exit status after SIGINT
const INTERRUPTED: u8 = 130;

/// Config file plus CLI overrides
pub fn effective_config(args: &RunArgs) -> anyhow::Result<Config> {
    let (path, explicit) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    info!("Loading config from {:?}", path);
    let mut config = Config::load_or_default(&path, explicit)?;

    if let Some(subject) = &args.subject {
        config.subject = subject.clone();
    }
    if let Some(task) = &args.task {
        config.task = task.clone();
    }
    if let Some(mode) = args.context_mode {
        config.context_mode = mode;
    }
    if args.cached {
        config.cached = true;
    }
    if !args.agents.is_empty() {
        config.agents = args
            .agents
            .iter()
            .map(|spec| spec.parse::<AgentConfig>())
            .collect::<Result<_, _>>()?;
    }
    if let Some(family) = args.arbiter_family {
        config.arbiter.family = family;
    }
    if let Some(model) = &args.arbiter_model {
        config.arbiter.model = Some(model.clone());
    }
    if let Some(mode) = args.arbiter_mode {
        config.arbiter.mode = mode;
    }
    if let Some(max_queries) = args.max_queries {
        config.max_queries = max_queries;
    }
    if let Some(workdir) = &args.workdir {
        config.workdir = workdir.clone();
    }
    if args.include_low_priority {
        config.include_low_priority = true;
    }
    if let Some(lang) = args.output_lang {
        config.output_lang = lang;
    }
    if let Some(timeout) = args.timeout_sec {
        config.timeout_sec = timeout;
    }
    config.copy_excludes.extend(args.copy_excludes.iter().cloned());

    config.validate()?;
    Ok(config)
}

pub async fn execute(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = effective_config(&args)?;

    if args.dry_run {
        info!("DRY RUN - no agent calls will be made");
        print_execution_plan(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let stdin = if config.context_mode == ContextMode::Stdin {
        Some(std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?)
    } else {
        None
    };

    cleanup::install_panic_hook();
    let request = PipelineRequest { config, stdin };
    match pipeline::run_until(request, cleanup::shutdown_signal()).await? {
        Some(report) => {
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            warn!("Interrupted; agent processes stopped and run directory removed");
            cleanup::cleanup_registered();
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

fn print_execution_plan(config: &Config) -> anyhow::Result<()> {
    let subject = config
        .subject
        .canonicalize()
        .with_context(|| format!("Subject {:?} not found", config.subject))?;
    let workdir = cleanup::resolve_workdir(&subject, &config.workdir)?;
    let reviewers = config.reviewers();
    let arbiter = config.arbiter.resolve(&reviewers);

    println!("\n=== Execution Plan ===\n");
    println!("Subject: {}", subject.display());
    println!("Workdir: {}", workdir.display());
    println!("Context mode: {:?}", config.context_mode);
    println!("Task: {}", config.task);

    println!("\nReviewers:");
    for reviewer in &reviewers {
        println!("  - {} ({})", reviewer.display_name(), reviewer.family);
    }

    let mode = match config.arbiter.mode {
        ArbiterMode::Single => "single-shot".to_string(),
        ArbiterMode::Multi => format!("up to {} questions", config.max_queries),
    };
    println!("\nArbiter: {} ({})", arbiter.display_name(), mode);
    println!(
        "Low-priority items: {}",
        if config.include_low_priority { "kept" } else { "suppressed" }
    );
    println!("Output language: {:?}", config.output_lang);
    println!("Timeout per call: {}s", config.timeout_sec);
    println!("Memos: {}", workdir.join("memos").display());
    println!();
    Ok(())
}
