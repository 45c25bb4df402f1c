use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid agent spec '{0}' (expected family:model[:effort])")]
    AgentSpec(String),

    #[error("Unknown agent family '{0}' (expected codex, gemini or claude)")]
    UnknownFamily(String),

    #[error("Agent name '{0}' is used more than once in this run")]
    DuplicateAgent(String),

    #[error("No reviewer agents configured")]
    NoAgents,
}

/// Workspace setup failures. Never fatal: the caller logs and continues
/// with whatever state the workspace ended up in.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("git {command} failed in {cwd}: {stderr}")]
    Git {
        command: String,
        cwd: PathBuf,
        stderr: String,
    },

    #[error("git apply rejected the {kind} patch in {path}: {stderr}")]
    PatchRejected {
        kind: &'static str,
        path: PathBuf,
        stderr: String,
    },

    #[error("Failed to build exclude pattern '{pattern}': {source}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One attempt at running an agent process.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("{agent} timed out after {timeout:?} (timeouts are not retried)")]
    TimedOut { agent: String, timeout: Duration },

    #[error("{agent} failed after {attempts} attempts: {source}")]
    Exhausted {
        agent: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

/// Agent output that does not have the expected shape. Always degraded
/// locally, never propagated to the pipeline caller.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Arbiter returned a control object that is neither a usable query nor a final report")]
    MalformedControl { raw: String },

    #[error("Arbiter referred to unknown reviewer '{target}'")]
    UnknownTarget { target: String, question: String },

    #[error("Arbiter asked '{target}' a question although queries were not allowed")]
    QueryDisallowed { target: String, question: String },

    #[error("Failed to parse MEMO_JSON for {agent}: {source}")]
    MemoDirective {
        agent: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raised before any destructive filesystem action is attempted.
#[derive(Error, Debug)]
pub enum SafetyViolation {
    #[error(
        "Refusing to delete '{0}': it does not contain the marker file. \
         Remove it manually if you are sure it is safe."
    )]
    MissingMarker(PathBuf),

    #[error("Workdir '{path}' must live strictly inside the subject root '{root}'")]
    OutsideBoundary { path: PathBuf, root: PathBuf },

    #[error("Run directory '{0}' already exists")]
    AlreadyExists(PathBuf),

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error while preparing '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("No git diff found (nothing to review)")]
    NoDiff,

    #[error("git diff exited with status {0}; is the subject a git repository?")]
    GitDiff(i32),

    #[error("No data read from stdin for context")]
    EmptyStdin,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RoundError {
    #[error("Failed to acquire semaphore: {0}")]
    Semaphore(#[from] tokio::sync::AcquireError),

    #[error("{round}: {source}")]
    Invocation {
        round: String,
        #[source]
        source: InvocationError,
    },

    #[error("{round}: task for {agent} panicked: {message}")]
    TaskPanicked {
        round: String,
        agent: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Safety violation: {0}")]
    Safety(#[from] SafetyViolation),

    #[error("Review round failed: {0}")]
    Round(#[from] RoundError),

    #[error("Arbiter failed: {0}")]
    Arbiter(#[from] InvocationError),
}
