use crate::config::ContextMode;
use crate::error::ContextError;
use crate::sandbox::git;
use std::io::Read;
use std::path::Path;

/// Produce the context text shared by every prompt.
///
/// Repo and diff modes only describe where to look; agents read the code
/// from their workspace. Stdin mode inlines whatever was piped in.
pub fn resolve_context(
    mode: ContextMode,
    cached: bool,
    subject: &Path,
    stdin: impl Read,
) -> Result<String, ContextError> {
    match mode {
        ContextMode::Repo => Ok("CONTEXT_MODE: repo\n\
             The code under review is the repository in your current working \
             directory. Read whatever files you need with your tools instead of \
             expecting code to be pasted here."
            .to_string()),
        ContextMode::Diff => {
            ensure_diff(subject, cached)?;
            let which = if cached {
                "staged changes (git diff --cached)"
            } else {
                "uncommitted changes (git diff)"
            };
            Ok(format!(
                "CONTEXT_MODE: diff\n\
                 The code under review is the set of {} in the repository in \
                 your current working directory. Inspect the diff and the \
                 surrounding code with your tools.",
                which
            ))
        }
        ContextMode::Stdin => {
            let text = read_stdin(stdin)?;
            Ok(format!(
                "CONTEXT_MODE: stdin\n\
                 Additional context supplied on stdin follows.\n\n{}",
                text
            ))
        }
    }
}

/// Fail fast when there is nothing to review
fn ensure_diff(subject: &Path, cached: bool) -> Result<(), ContextError> {
    match git::diff_status(subject, cached)? {
        0 => Err(ContextError::NoDiff),
        1 => Ok(()),
        code => Err(ContextError::GitDiff(code)),
    }
}

fn read_stdin(mut stdin: impl Read) -> Result<String, ContextError> {
    let mut text = String::new();
    stdin.read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Err(ContextError::EmptyStdin);
    }
    Ok(text)
}
