//! Marker-gated removal of run directories.
//!
//! Nothing is ever deleted recursively unless it carries [`MARKER_FILE`].
//! Provisioned paths are tracked in a process-wide registry so a panic or
//! a termination signal can still clean up what the run left behind.

use crate::error::SafetyViolation;
use crate::sandbox::git;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, OnceLock};
use tracing::{debug, info, warn};

pub const MARKER_FILE: &str = ".crossrev_workspace";

/// Provisioned run directories, each with the repository whose worktrees
/// may live under it
#[derive(Debug, Default)]
struct Registry {
    entries: Mutex<HashMap<PathBuf, Option<PathBuf>>>,
}

impl Registry {
    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Option<PathBuf>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn track(&self, path: &Path, repo: Option<&Path>) {
        self.entries()
            .insert(path.to_path_buf(), repo.map(Path::to_path_buf));
    }

    fn forget(&self, path: &Path) {
        self.entries().remove(path);
    }

    #[cfg(test)]
    fn contains(&self, path: &Path) -> bool {
        self.entries().contains_key(path)
    }

    /// Drain the registry and destroy what it held. Unmarked paths are left alone.
    fn destroy_all(&self) {
        let pending: Vec<(PathBuf, Option<PathBuf>)> = self.entries().drain().collect();
        for (path, repo) in pending {
            match destroy_marked(&path, repo.as_deref()) {
                Ok(()) => info!("Cleaned up {}", path.display()),
                Err(e) => warn!("{}", e),
            }
        }
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::default)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SafetyViolation + '_ {
    move |source| SafetyViolation::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn has_marker(path: &Path) -> bool {
    path.join(MARKER_FILE).is_file()
}

/// Create a fresh run directory, stamp the marker and register it.
pub fn provision(path: &Path, repo: Option<&Path>) -> Result<(), SafetyViolation> {
    if path.exists() {
        return Err(SafetyViolation::AlreadyExists(path.to_path_buf()));
    }
    fs::create_dir_all(path).map_err(io_error(path))?;
    fs::write(
        path.join(MARKER_FILE),
        "crossrev run directory; removed automatically when the run ends\n",
    )
    .map_err(io_error(path))?;

    registry().track(path, repo);
    debug!("Provisioned run directory {}", path.display());
    Ok(())
}

/// Remove a marked directory, including git worktrees rooted under it.
///
/// Fails without touching anything when the marker is missing. The path is
/// deregistered whatever the outcome.
pub fn destroy(path: &Path, repo: Option<&Path>) -> Result<(), SafetyViolation> {
    let result = destroy_marked(path, repo);
    registry().forget(path);
    result
}

fn destroy_marked(path: &Path, repo: Option<&Path>) -> Result<(), SafetyViolation> {
    if !path.exists() {
        return Ok(());
    }
    if !has_marker(path) {
        return Err(SafetyViolation::MissingMarker(path.to_path_buf()));
    }

    if let Some(repo) = repo {
        remove_worktrees_under(repo, path);
    }

    // Worktree removal runs external commands; check again right before deleting.
    if !has_marker(path) {
        return Err(SafetyViolation::MissingMarker(path.to_path_buf()));
    }
    fs::remove_dir_all(path).map_err(|source| SafetyViolation::Remove {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(repo) = repo {
        if let Err(e) = git::prune_worktrees(repo) {
            warn!("git worktree prune failed: {}", e);
        }
    }
    debug!("Removed run directory {}", path.display());
    Ok(())
}

fn remove_worktrees_under(repo: &Path, parent: &Path) {
    let worktrees = match git::list_worktrees(repo) {
        Ok(list) => list,
        Err(e) => {
            warn!("Failed to list git worktrees: {}", e);
            return;
        }
    };

    let parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    for worktree in worktrees {
        let resolved = worktree.canonicalize().unwrap_or_else(|_| worktree.clone());
        if resolved == parent || !resolved.starts_with(&parent) {
            continue;
        }
        if let Err(e) = git::remove_worktree(repo, &worktree) {
            warn!("Failed to remove worktree {}: {}", worktree.display(), e);
        }
    }
}

/// Best-effort destroy of every registered run directory
pub fn cleanup_registered() {
    registry().destroy_all();
}

#[cfg(test)]
fn is_registered(path: &Path) -> bool {
    registry().contains(path)
}

/// Clean registered run directories when the process panics.
///
/// Subsequent calls are no-ops. Signals are handled by racing the run
/// against [`shutdown_signal`] so in-flight agent processes are dropped
/// (and killed) before the directories go.
pub fn install_panic_hook() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            cleanup_registered();
        }));
    });
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                debug!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Owns a provisioned run directory and destroys it on drop.
#[derive(Debug)]
pub struct RunGuard {
    path: PathBuf,
    repo: Option<PathBuf>,
    armed: bool,
}

impl RunGuard {
    pub fn provision(path: PathBuf, repo: Option<PathBuf>) -> Result<Self, SafetyViolation> {
        provision(&path, repo.as_deref())?;
        Ok(Self {
            path,
            repo,
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn destroy(mut self) -> Result<(), SafetyViolation> {
        self.armed = false;
        destroy(&self.path, self.repo.as_deref())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = destroy(&self.path, self.repo.as_deref()) {
                warn!("{}", e);
            }
        }
    }
}

/// Remove leftover `run-*` directories under `workdir_root`.
///
/// Unmarked directories are skipped. Returns (removed, skipped).
pub fn clean_stale(workdir_root: &Path, repo: Option<&Path>) -> std::io::Result<(usize, usize)> {
    let mut removed = 0;
    let mut skipped = 0;
    if !workdir_root.is_dir() {
        return Ok((removed, skipped));
    }

    for entry in fs::read_dir(workdir_root)? {
        let entry = entry?;
        let path = entry.path();
        let is_run = entry.file_name().to_string_lossy().starts_with("run-");
        if !is_run || !entry.file_type()?.is_dir() {
            continue;
        }
        match destroy(&path, repo) {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!("{}", e);
                skipped += 1;
            }
        }
    }
    Ok((removed, skipped))
}

/// Lexically resolve `.` and `..`
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-attach the rest
fn resolve_through_symlinks(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                missing.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Resolve the workdir root against `subject` and require it to live
/// strictly inside the subject. Runs before anything is created.
pub fn resolve_workdir(subject: &Path, workdir: &Path) -> Result<PathBuf, SafetyViolation> {
    let root = subject.canonicalize().map_err(io_error(subject))?;
    let candidate = if workdir.is_absolute() {
        workdir.to_path_buf()
    } else {
        root.join(workdir)
    };
    let resolved =
        resolve_through_symlinks(&normalize(&candidate)).map_err(io_error(&candidate))?;

    if resolved == root || !resolved.starts_with(&root) {
        return Err(SafetyViolation::OutsideBoundary {
            path: resolved,
            root,
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::git::tests::init_repo;
    use tempfile::TempDir;

    #[test]
    fn test_destroy_without_marker_leaves_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run-unmarked");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/file.txt"), "keep me").unwrap();

        let err = destroy(&dir, None).unwrap_err();
        assert!(matches!(err, SafetyViolation::MissingMarker(_)));
        assert_eq!(fs::read_to_string(dir.join("nested/file.txt")).unwrap(), "keep me");
    }

    #[test]
    fn test_destroy_with_marker_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run-marked");
        provision(&dir, None).unwrap();
        assert!(has_marker(&dir));
        assert!(is_registered(&dir));
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::write(dir.join("a/b/c.txt"), "x").unwrap();

        destroy(&dir, None).unwrap();
        assert!(!dir.exists());
        assert!(!is_registered(&dir));
    }

    #[test]
    fn test_destroy_removes_nested_worktrees() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let run = repo.path().join(".crossrev/run-1");
        provision(&run, Some(repo.path())).unwrap();

        let checkout = run.join("agent/repo");
        git::create_detached_worktree(repo.path(), &checkout, "HEAD").unwrap();
        assert_eq!(git::list_worktrees(repo.path()).unwrap().len(), 2);

        destroy(&run, Some(repo.path())).unwrap();
        assert!(!run.exists());
        assert_eq!(git::list_worktrees(repo.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_provision_refuses_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = provision(tmp.path(), None).unwrap_err();
        assert!(matches!(err, SafetyViolation::AlreadyExists(_)));
    }

    #[test]
    fn test_run_guard_destroys_on_drop() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run-guarded");
        {
            let guard = RunGuard::provision(dir.clone(), None).unwrap();
            assert!(guard.path().exists());
        }
        assert!(!dir.exists());
        assert!(!is_registered(&dir));
    }

    #[test]
    fn test_registry_destroys_marked_and_keeps_unmarked() {
        let tmp = TempDir::new().unwrap();
        let marked = tmp.path().join("run-marked");
        let unmarked = tmp.path().join("run-unmarked");
        fs::create_dir_all(marked.join("agent")).unwrap();
        fs::write(marked.join(MARKER_FILE), "").unwrap();
        fs::create_dir_all(&unmarked).unwrap();
        fs::write(unmarked.join("notes.txt"), "keep me").unwrap();

        let registry = Registry::default();
        registry.track(&marked, None);
        registry.track(&unmarked, None);
        registry.destroy_all();

        assert!(!marked.exists());
        assert_eq!(fs::read_to_string(unmarked.join("notes.txt")).unwrap(), "keep me");
        assert!(!registry.contains(&marked));
        assert!(!registry.contains(&unmarked));
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn test_clean_stale_skips_unmarked() {
        let tmp = TempDir::new().unwrap();
        provision(&tmp.path().join("run-a"), None).unwrap();
        fs::create_dir_all(tmp.path().join("run-b")).unwrap();
        fs::create_dir_all(tmp.path().join("memos")).unwrap();

        let (removed, skipped) = clean_stale(tmp.path(), None).unwrap();
        assert_eq!((removed, skipped), (1, 1));
        assert!(!tmp.path().join("run-a").exists());
        assert!(tmp.path().join("run-b").exists());
        assert!(tmp.path().join("memos").exists());
    }

    #[test]
    fn test_resolve_workdir_inside_subject() {
        let subject = TempDir::new().unwrap();
        let root = subject.path().canonicalize().unwrap();

        let resolved = resolve_workdir(subject.path(), Path::new(".crossrev")).unwrap();
        assert_eq!(resolved, root.join(".crossrev"));

        let resolved = resolve_workdir(subject.path(), Path::new("a/../b/./c")).unwrap();
        assert_eq!(resolved, root.join("b/c"));
    }

    #[test]
    fn test_resolve_workdir_rejects_escapes() {
        let subject = TempDir::new().unwrap();
        for workdir in ["..", "../sibling", ".", "a/../.."] {
            let err = resolve_workdir(subject.path(), Path::new(workdir)).unwrap_err();
            assert!(
                matches!(err, SafetyViolation::OutsideBoundary { .. }),
                "{workdir} should be rejected"
            );
        }

        let elsewhere = TempDir::new().unwrap();
        let err = resolve_workdir(subject.path(), elsewhere.path()).unwrap_err();
        assert!(matches!(err, SafetyViolation::OutsideBoundary { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_workdir_rejects_symlink_escape() {
        let subject = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), subject.path().join("link")).unwrap();

        let err = resolve_workdir(subject.path(), Path::new("link/work")).unwrap_err();
        assert!(matches!(err, SafetyViolation::OutsideBoundary { .. }));
    }
}
