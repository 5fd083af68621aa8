//! Error types for Gantry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a build ends up marked as failed.
///
/// `StepFailure` is recorded by the pipeline runner and only flips the sticky
/// `ok` flag. Every other kind ends the build with a single log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildFailure {
    #[error("unable to load {manifest} (missing from the repo ?)")]
    ManifestMissing { manifest: String },

    #[error("invalid YAML syntax in {manifest}")]
    ManifestInvalid { manifest: String },

    #[error("{0}")]
    VcsFailure(String),

    #[error("step \"{snippet}\" exited with code {code}")]
    StepFailure { snippet: String, code: i32 },

    #[error("unexpected condition -> {0}")]
    UnexpectedFailure(String),
}

impl BuildFailure {
    /// The single line written to a build log when the build aborts.
    pub fn log_line(&self) -> String {
        format!("* {}", self)
    }
}
