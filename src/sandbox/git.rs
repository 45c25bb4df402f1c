use crate::error::SandboxError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Whether `path` is the root of a git repository (or worktree)
pub fn is_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

fn run_git(args: &[&str], cwd: &Path, input: Option<&str>) -> Result<Output, SandboxError> {
    let mut cmd = Command::new("git");
    cmd.current_dir(cwd)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let Some(input) = input else {
        return Ok(cmd.output()?);
    };

    cmd.stdin(Stdio::piped());
    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }
    Ok(child.wait_with_output()?)
}

fn check(output: Output, args: &[&str], cwd: &Path) -> Result<Output, SandboxError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(SandboxError::Git {
            command: args.join(" "),
            cwd: cwd.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Unified diff of in-flight changes: staged (`--cached`) or unstaged
pub fn current_diff(repo: &Path, staged: bool) -> Result<String, SandboxError> {
    let args: &[&str] = if staged {
        &["diff", "--binary", "--cached"]
    } else {
        &["diff", "--binary"]
    };
    let output = check(run_git(args, repo, None)?, args, repo)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Exit status of `git diff --quiet`: 0 = no changes, 1 = changes, other = error
pub fn diff_status(repo: &Path, staged: bool) -> std::io::Result<i32> {
    let mut cmd = Command::new("git");
    cmd.current_dir(repo).arg("diff");
    if staged {
        cmd.arg("--cached");
    }
    let status = cmd
        .arg("--quiet")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.code().unwrap_or(-1))
}

/// `git worktree add --detach <dest> <reference>`
pub fn create_detached_worktree(
    repo: &Path,
    dest: &Path,
    reference: &str,
) -> Result<(), SandboxError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dest_str = dest.to_string_lossy();
    let args = ["worktree", "add", "--detach", dest_str.as_ref(), reference];
    check(run_git(&args, repo, None)?, &args, repo)?;
    Ok(())
}

/// Apply a patch inside a checkout. `to_index` also stages it.
pub fn apply_patch(checkout: &Path, patch: &str, to_index: bool) -> Result<(), SandboxError> {
    if patch.trim().is_empty() {
        return Ok(());
    }
    let args: &[&str] = if to_index {
        &["apply", "--index"]
    } else {
        &["apply"]
    };
    let output = run_git(args, checkout, Some(patch))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(SandboxError::PatchRejected {
            kind: if to_index { "staged" } else { "unstaged" },
            path: checkout.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Paths of all worktrees registered in `repo`
pub fn list_worktrees(repo: &Path) -> Result<Vec<PathBuf>, SandboxError> {
    let args = ["worktree", "list", "--porcelain"];
    let output = check(run_git(&args, repo, None)?, &args, repo)?;
    Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_worktree_list(porcelain: &str) -> Vec<PathBuf> {
    porcelain
        .lines()
        .filter_map(|line| line.trim().strip_prefix("worktree "))
        .map(PathBuf::from)
        .collect()
}

pub fn remove_worktree(repo: &Path, path: &Path) -> Result<(), SandboxError> {
    let path_str = path.to_string_lossy();
    let args = ["worktree", "remove", "--force", path_str.as_ref()];
    check(run_git(&args, repo, None)?, &args, repo)?;
    Ok(())
}

/// Drop bookkeeping for worktrees whose directories are gone
pub fn prune_worktrees(repo: &Path) -> Result<(), SandboxError> {
    let args = ["worktree", "prune"];
    check(run_git(&args, repo, None)?, &args, repo)?;
    Ok(())
}
