use crate::cleanup;
use crate::cli::CleanArgs;
use crate::config::Config;
use crate::sandbox::git;
use anyhow::Context;
use std::path::PathBuf;
use tracing::{info, warn};

pub fn execute(args: CleanArgs) -> anyhow::Result<()> {
    let (path, explicit) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from("crossrev.yaml"), false),
    };
    let config = Config::load_or_default(&path, explicit)?;

    let subject = args.subject.unwrap_or(config.subject);
    let subject = subject
        .canonicalize()
        .with_context(|| format!("Subject {:?} not found", subject))?;
    let workdir = cleanup::resolve_workdir(&subject, &args.workdir.unwrap_or(config.workdir))?;
    let repo = git::is_repo(&subject).then_some(subject.as_path());

    info!("Scanning {} for leftover run directories", workdir.display());
    let (removed, skipped) = cleanup::clean_stale(&workdir, repo)?;
    if skipped > 0 {
        warn!("{} unmarked directories left in place", skipped);
    }
    println!("Removed {} run directories", removed);
    Ok(())
}
