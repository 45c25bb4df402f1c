//! Per-agent workspaces inside a run directory.
//!
//! Git subjects get a detached worktree with the user's uncommitted changes
//! replayed on top; everything else gets a filtered copy. Failures here are
//! warnings: an agent always gets a directory, even if it ends up emptier
//! than intended.

pub mod copy;
pub mod git;

use crate::config::ContextMode;
use crate::error::SandboxError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use copy::DEFAULT_EXCLUDES;

/// In-flight changes captured once per run
#[derive(Debug, Clone, Default)]
struct Patches {
    staged: String,
    unstaged: String,
}

#[derive(Debug)]
pub struct Provisioner {
    subject: PathBuf,
    run_dir: PathBuf,
    excludes: Vec<String>,
    skip: Vec<PathBuf>,
    patches: Option<Patches>,
}

impl Provisioner {
    /// `workdir_root` is never copied into a workspace.
    pub fn new(
        subject: &Path,
        run_dir: &Path,
        workdir_root: &Path,
        context_mode: ContextMode,
        extra_excludes: &[String],
    ) -> Self {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        if context_mode != ContextMode::Diff {
            excludes.push(".git".to_string());
        }
        excludes.extend(extra_excludes.iter().cloned());

        let patches = git::is_repo(subject).then(|| Patches {
            staged: capture_diff(subject, true),
            unstaged: capture_diff(subject, false),
        });

        Self {
            subject: subject.to_path_buf(),
            run_dir: run_dir.to_path_buf(),
            excludes,
            skip: vec![workdir_root.to_path_buf()],
            patches,
        }
    }

    /// Repository root when workspaces are git worktrees
    pub fn repo_root(&self) -> Option<&Path> {
        self.patches.as_ref().map(|_| self.subject.as_path())
    }

    /// Build the workspace for one reviewer and return its path
    pub fn provision(&self, slug: &str) -> PathBuf {
        let agent_dir = self.run_dir.join(slug);

        if let Some(patches) = &self.patches {
            let checkout = agent_dir.join("repo");
            match git::create_detached_worktree(&self.subject, &checkout, "HEAD") {
                Ok(()) => {
                    apply_patches(&checkout, patches);
                    debug!("Worktree ready at {}", checkout.display());
                    return checkout;
                }
                Err(e) => {
                    warn!("Failed to create git worktree for {}: {}", slug, e);
                    info!("Falling back to a filtered copy");
                }
            }
        }

        if let Err(e) = self.copy_into(&agent_dir) {
            warn!("Failed to copy subject into {}: {}", agent_dir.display(), e);
            ensure_dir(&agent_dir);
        }
        agent_dir
    }

    /// Workspace with no codebase view (the arbiter's)
    pub fn empty_workspace(&self, slug: &str) -> PathBuf {
        let dir = self.run_dir.join(slug);
        ensure_dir(&dir);
        dir
    }

    fn copy_into(&self, dest: &Path) -> Result<(), SandboxError> {
        let stats = copy::copy_tree_filtered(&self.subject, dest, &self.excludes, &self.skip)?;
        debug!(
            "Copied {} files ({} dirs, {} symlinks skipped) into {}",
            stats.files,
            stats.dirs,
            stats.skipped_links,
            dest.display()
        );
        Ok(())
    }
}

fn capture_diff(subject: &Path, staged: bool) -> String {
    git::current_diff(subject, staged).unwrap_or_else(|e| {
        warn!("Failed to capture uncommitted changes: {}", e);
        String::new()
    })
}

fn apply_patches(checkout: &Path, patches: &Patches) {
    if let Err(e) = git::apply_patch(checkout, &patches.staged, true) {
        warn!("{}; continuing with the unpatched checkout", e);
    }
    if let Err(e) = git::apply_patch(checkout, &patches.unstaged, false) {
        warn!("{}; continuing without unstaged changes", e);
    }
}

fn ensure_dir(dir: &Path) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("Failed to create workspace {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").current_dir(dir).args(args).output().unwrap();
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    #[test]
    fn test_worktree_carries_staged_and_unstaged_changes() {
        let subject = TempDir::new().unwrap();
        git::tests::init_repo(subject.path());
        fs::write(subject.path().join("staged.txt"), "staged\n").unwrap();
        git(subject.path(), &["add", "staged.txt"]);
        fs::write(subject.path().join("file.txt"), "edited\n").unwrap();

        let workdir_root = subject.path().join(".crossrev");
        let run_dir = workdir_root.join("run-test");
        let provisioner =
            Provisioner::new(subject.path(), &run_dir, &workdir_root, ContextMode::Repo, &[]);
        assert_eq!(provisioner.repo_root(), Some(subject.path()));

        let workspace = provisioner.provision("agent-abc");
        assert_eq!(workspace, run_dir.join("agent-abc/repo"));
        assert_eq!(fs::read_to_string(workspace.join("file.txt")).unwrap(), "edited\n");
        assert_eq!(fs::read_to_string(workspace.join("staged.txt")).unwrap(), "staged\n");
        assert!(git(&workspace, &["diff", "--cached", "--name-only"]).contains("staged.txt"));

        git::remove_worktree(subject.path(), &workspace).unwrap();
    }

    #[test]
    fn test_plain_directory_is_copied_without_workdir() {
        let subject = TempDir::new().unwrap();
        fs::write(subject.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(subject.path().join("app.log"), "noise").unwrap();
        let workdir_root = subject.path().join(".crossrev");
        let run_dir = workdir_root.join("run-test");
        fs::create_dir_all(&run_dir).unwrap();

        let provisioner =
            Provisioner::new(subject.path(), &run_dir, &workdir_root, ContextMode::Repo, &[]);
        assert!(provisioner.repo_root().is_none());

        let workspace = provisioner.provision("agent-abc");
        assert_eq!(workspace, run_dir.join("agent-abc"));
        assert!(workspace.join("main.rs").exists());
        assert!(!workspace.join("app.log").exists());
        assert!(!workspace.join(".crossrev").exists());
    }

    #[test]
    fn test_repo_without_commits_falls_back_to_copy() {
        let subject = TempDir::new().unwrap();
        git(subject.path(), &["init", "-q"]);
        fs::write(subject.path().join("lib.rs"), "").unwrap();
        let workdir_root = subject.path().join(".crossrev");
        let run_dir = workdir_root.join("run-test");

        let provisioner =
            Provisioner::new(subject.path(), &run_dir, &workdir_root, ContextMode::Repo, &[]);
        let workspace = provisioner.provision("agent-abc");

        assert_eq!(workspace, run_dir.join("agent-abc"));
        assert!(workspace.join("lib.rs").exists());
        assert!(!workspace.join(".git").exists());
    }

    #[test]
    fn test_extra_excludes_apply() {
        let subject = TempDir::new().unwrap();
        fs::write(subject.path().join("keep.py"), "").unwrap();
        fs::write(subject.path().join("fixture.bin"), "").unwrap();
        let workdir_root = subject.path().join(".crossrev");
        let run_dir = workdir_root.join("run-test");

        let provisioner = Provisioner::new(
            subject.path(),
            &run_dir,
            &workdir_root,
            ContextMode::Repo,
            &["*.bin".to_string()],
        );
        let workspace = provisioner.provision("agent-abc");
        assert!(workspace.join("keep.py").exists());
        assert!(!workspace.join("fixture.bin").exists());
    }

    #[test]
    fn test_arbiter_workspace_is_empty() {
        let subject = TempDir::new().unwrap();
        fs::write(subject.path().join("main.rs"), "").unwrap();
        let workdir_root = subject.path().join(".crossrev");
        let run_dir = workdir_root.join("run-test");

        let provisioner =
            Provisioner::new(subject.path(), &run_dir, &workdir_root, ContextMode::Repo, &[]);
        let dir = provisioner.empty_workspace("arbiter-abc");
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }
}
