use crate::error::SandboxError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Basenames never copied into a sandbox: caches, dependency trees, build
/// output, logs, local databases and secrets.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "__pycache__",
    "*.pyc",
    ".venv",
    "venv",
    "env",
    "ENV",
    "node_modules",
    "dist",
    "build",
    "target",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".idea",
    ".vscode",
    ".env*",
    "*.log",
    "*.sqlite",
    "*.sqlite3",
    "*.db",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub skipped_links: usize,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SandboxError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| SandboxError::GlobPattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SandboxError::GlobPattern {
        pattern: "exclude set".to_string(),
        source: e,
    })
}

/// Copy `src` into `dest`, skipping entries whose basename matches one of
/// `patterns` and any path listed in `skip`. Symbolic links are neither
/// followed nor copied.
pub fn copy_tree_filtered(
    src: &Path,
    dest: &Path,
    patterns: &[String],
    skip: &[PathBuf],
) -> Result<CopyStats, SandboxError> {
    let excluded = build_globset(patterns)?;
    let skip = skip.to_vec();

    fs::create_dir_all(dest)?;

    let walker = WalkBuilder::new(src)
        .standard_filters(false) // no hidden/.gitignore semantics, only our patterns
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.depth() == 0
                || !(excluded.is_match(Path::new(entry.file_name()))
                    || skip.iter().any(|p| p == entry.path()))
        })
        .build();

    let mut stats = CopyStats::default();
    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };

        let target = dest.join(rel);
        if file_type.is_symlink() {
            debug!("Skipping symlink {}", entry.path().display());
            stats.skipped_links += 1;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            stats.dirs += 1;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}
