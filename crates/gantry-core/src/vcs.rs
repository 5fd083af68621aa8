//! Version control seam used by the repository cache.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git {operation} failed: {detail}")]
    CommandFailed { operation: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VcsResult<T> = std::result::Result<T, VcsError>;

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clone only `branch` of `url` into `dest`.
    async fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> VcsResult<()>;

    /// Fetch `branch` from `origin` into the working copy at `dest`.
    async fn fetch(&self, dest: &Path, branch: &str) -> VcsResult<()>;

    /// Force-checkout `sha`, discarding local modifications.
    async fn checkout(&self, dest: &Path, sha: &str) -> VcsResult<()>;
}
