//! One bounded review run, from workdir validation to the final report.

use crate::agent::{self, Agent};
use crate::arbiter::{ArbiterEngine, ReviewSet};
use crate::cleanup::{self, RunGuard};
use crate::config::{AgentConfig, ArbiterMode, Config, OutputLang};
use crate::context::resolve_context;
use crate::error::{PipelineError, SafetyViolation};
use crate::memo::{self, MemoStore};
use crate::progress::{Phase, Progress, ProgressReporter};
use crate::prompt::{self, Brief};
use crate::provider::{create_runner, Runner};
use crate::report;
use crate::runner::{run_round, Invoker};
use crate::sandbox::Provisioner;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub struct PipelineRequest {
    /// Effective settings, CLI overrides already applied
    pub config: Config,
    /// Text piped in for `ContextMode::Stdin`
    pub stdin: Option<String>,
}

/// Run the whole review and return the final report.
pub async fn run(request: PipelineRequest) -> Result<String, PipelineError> {
    let providers = request.config.providers.clone();
    run_with(request, move |agent| create_runner(&providers, agent)).await
}

/// Race the run against `shutdown`.
///
/// `Ok(None)` means `shutdown` won. The run future has been dropped by then,
/// so its agent tasks are aborted and its run directory removed.
pub async fn run_until<S>(
    request: PipelineRequest,
    shutdown: S,
) -> Result<Option<String>, PipelineError>
where
    S: Future<Output = ()>,
{
    interruptible(run(request), shutdown).await
}

async fn interruptible<R, S>(run: R, shutdown: S) -> Result<Option<String>, PipelineError>
where
    R: Future<Output = Result<String, PipelineError>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        result = run => result.map(Some),
        _ = shutdown => Ok(None),
    }
}

fn run_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &id[..8])
}

/// [`run`] with an explicit backend per agent
pub(crate) async fn run_with<F>(
    request: PipelineRequest,
    backend_for: F,
) -> Result<String, PipelineError>
where
    F: Fn(&AgentConfig) -> Arc<dyn Runner>,
{
    let PipelineRequest { config, stdin } = request;
    config.validate()?;

    let subject = config
        .subject
        .canonicalize()
        .map_err(|source| SafetyViolation::Io {
            path: config.subject.clone(),
            source,
        })?;
    let workdir_root = cleanup::resolve_workdir(&subject, &config.workdir)?;

    let context = resolve_context(
        config.context_mode,
        config.cached,
        &subject,
        stdin.as_deref().unwrap_or_default().as_bytes(),
    )?;

    let reviewer_configs = config.reviewers();
    let arbiter_config = config.arbiter.resolve(&reviewer_configs);

    let run_dir = workdir_root.join(run_id());
    let provisioner = Provisioner::new(
        &subject,
        &run_dir,
        &workdir_root,
        config.context_mode,
        &config.copy_excludes,
    );
    let guard = RunGuard::provision(run_dir, provisioner.repo_root().map(PathBuf::from))?;
    info!("Run directory: {}", guard.path().display());

    let budget = match config.arbiter.mode {
        ArbiterMode::Single => 0,
        ArbiterMode::Multi => config.max_queries,
    };
    let progress = Progress::new(budget);
    let reporter = ProgressReporter::spawn(
        progress.clone(),
        Duration::from_secs(config.progress_interval_sec.max(1)),
    );

    let memos = MemoStore::new(workdir_root.join("memos"));
    let reviewers: Vec<Arc<Agent>> = reviewer_configs
        .iter()
        .map(|cfg| {
            let name = cfg.display_name();
            info!("Preparing workspace for {}", name);
            Arc::new(Agent::new(
                cfg,
                provisioner.provision(&agent::slug(&name)),
                memos.dir_for(&name),
                backend_for(cfg),
            ))
        })
        .collect();

    let arbiter_name = arbiter_config.display_name();
    let arbiter = Agent::new(
        &arbiter_config,
        provisioner.empty_workspace(&agent::slug(&arbiter_name)),
        memos.dir_for(&arbiter_name),
        backend_for(&arbiter_config),
    );

    let invoker = Invoker::new(
        Duration::from_secs(config.timeout_sec),
        config.retry.clone(),
    );

    let result = review(&config, &context, &reviewers, &arbiter, &invoker, &progress).await;
    reporter.stop().await;
    let report = result?;

    progress.set_phase(Phase::Cleanup);
    info!("Removing run directory {}", guard.path().display());
    guard.destroy()?;

    Ok(report)
}

async fn review(
    config: &Config,
    context: &str,
    reviewers: &[Arc<Agent>],
    arbiter: &Agent,
    invoker: &Invoker,
    progress: &Progress,
) -> Result<String, PipelineError> {
    let task: Arc<str> = Arc::from(config.task.as_str());
    let context: Arc<str> = Arc::from(context);

    progress.start_round(Phase::InitialReviews, reviewers.len());
    let initial = run_round("Round 1: initial reviews", reviewers, progress, |agent| {
        let invoker = invoker.clone();
        let task = task.clone();
        let context = context.clone();
        async move {
            let brief = Brief {
                task: &task,
                context: &context,
            };
            let prompt = prompt::initial_review(&agent.name, &brief, &memo::load(&agent));
            invoker.invoke(&agent, &prompt).await
        }
    })
    .await?;

    progress.start_round(Phase::CrossCheck, reviewers.len());
    let peers: Arc<BTreeMap<String, String>> = Arc::new(initial.clone());
    let latest = run_round("Round 2: cross-check", reviewers, progress, |agent| {
        let invoker = invoker.clone();
        let task = task.clone();
        let context = context.clone();
        let peers = peers.clone();
        async move {
            let brief = Brief {
                task: &task,
                context: &context,
            };
            let own = peers.get(&agent.name).map(String::as_str).unwrap_or_default();
            let prompt = prompt::cross_check(&agent.name, &brief, own, &peers, &memo::load(&agent));
            invoker.invoke(&agent, &prompt).await
        }
    })
    .await?;

    progress.set_phase(Phase::Arbiter);
    let engine = ArbiterEngine {
        arbiter,
        reviewers,
        invoker,
        brief: Brief {
            task: &task,
            context: &context,
        },
        mode: config.arbiter.mode,
        max_queries: config.max_queries,
        include_low_priority: config.include_low_priority,
        progress,
    };
    let outcome = engine.run(&ReviewSet { initial, latest }).await?;
    info!(
        "Arbiter finished after {} calls and {} questions",
        outcome.calls,
        outcome.history.len()
    );

    progress.set_phase(Phase::Assembling);
    let mut report = outcome.report;
    if !config.include_low_priority {
        report = report::suppress_low_priority(&report);
    }
    if config.output_lang == OutputLang::Zh {
        report = report::translate_zh(invoker, arbiter, &report).await;
    }
    Ok(report)
}
