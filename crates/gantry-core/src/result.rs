//! Build results and the status key scheme.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::build::short_sha;
use crate::{BuildFailure, Error, Result};

/// Badge lines longer than this are clipped.
pub const BADGE_LINE_WIDTH: usize = 80;

/// Tagline shown for keys that have never been built.
pub const NOT_INDEXED_TAGLINE: &str = "repo not indexed (check your git hook)";

/// Persisted outcome of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub ok: bool,
    pub sha: String,
    pub log: Vec<String>,
    /// Wall-clock seconds from dequeue to publish.
    pub seconds: u64,
}

impl BuildResult {
    /// A failed result carrying the single abort line for `failure`.
    pub fn aborted(sha: impl Into<String>, failure: &BuildFailure, seconds: u64) -> Self {
        Self {
            ok: false,
            sha: sha.into(),
            log: vec![failure.log_line()],
            seconds,
        }
    }

    /// The log as newline-separated text.
    pub fn log_text(&self) -> String {
        self.log.join("\n")
    }

    /// `integration passed (ran in 12s, commit ab12cd34ef)`
    pub fn tagline(&self) -> String {
        format!(
            "integration {} (ran in {}s, commit {})",
            if self.ok { "passed" } else { "failed" },
            self.seconds,
            short_sha(&self.sha)
        )
    }

    /// Log lines for badge rendering, each at most `BADGE_LINE_WIDTH` chars.
    pub fn clipped_log(&self) -> Vec<String> {
        self.log.iter().map(|line| clip_line(line)).collect()
    }
}

/// Cut lines longer than 80 chars to 77 chars plus `...`.
pub fn clip_line(line: &str) -> String {
    if line.chars().count() <= BADGE_LINE_WIDTH {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(BADGE_LINE_WIDTH - 3).collect();
    clipped.push_str("...");
    clipped
}

/// `{branch}:{repository}`, the identity a build reports under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusKey {
    pub branch: String,
    pub repository: String,
}

impl StatusKey {
    pub fn new(branch: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            repository: repository.into(),
        }
    }

    /// Store key holding the latest `BuildResult`.
    pub fn status(&self) -> String {
        format!("status:{}", self)
    }

    /// Store key holding the raw push payload used for rebuilds.
    pub fn payload(&self) -> String {
        format!("git:{}", self)
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch, self.repository)
    }
}

impl std::str::FromStr for StatusKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Git refs cannot contain ':' so the first one separates the branch.
        match s.split_once(':') {
            Some((branch, repository)) if !branch.is_empty() && !repository.is_empty() => {
                Ok(Self::new(branch, repository))
            }
            _ => Err(Error::InvalidInput(format!(
                "expected <branch>:<repository>, got \"{}\"",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildResult {
        BuildResult {
            ok: true,
            sha: "ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12".to_string(),
            log: vec![
                "- build".to_string(),
                "[passed] make (1s)".to_string(),
            ],
            seconds: 12,
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["sha"], "ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12");
        assert_eq!(json["seconds"], 12);
        assert_eq!(json["log"][1], "[passed] make (1s)");

        let parsed: BuildResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_tagline() {
        let mut result = sample();
        assert_eq!(
            result.tagline(),
            "integration passed (ran in 12s, commit ab12cd34ef)"
        );
        result.ok = false;
        assert_eq!(
            result.tagline(),
            "integration failed (ran in 12s, commit ab12cd34ef)"
        );
    }

    #[test]
    fn test_clip_line() {
        let short = "x".repeat(80);
        assert_eq!(clip_line(&short), short);

        let long = "y".repeat(81);
        let clipped = clip_line(&long);
        assert_eq!(clipped.len(), 80);
        assert!(clipped.ends_with("..."));
        assert_eq!(&clipped[..77], &"y".repeat(77));
    }

    #[test]
    fn test_aborted_result() {
        let failure = BuildFailure::VcsFailure("unable to checkout ab12cd34ef".to_string());
        let result = BuildResult::aborted("ab12cd34ef56", &failure, 3);
        assert!(!result.ok);
        assert_eq!(result.log, vec!["* unable to checkout ab12cd34ef".to_string()]);
    }

    #[test]
    fn test_status_key() {
        let key: StatusKey = "main:acme/widgets".parse().unwrap();
        assert_eq!(key.branch, "main");
        assert_eq!(key.repository, "acme/widgets");
        assert_eq!(key.status(), "status:main:acme/widgets");
        assert_eq!(key.payload(), "git:main:acme/widgets");

        assert!("no-separator".parse::<StatusKey>().is_err());
        assert!(":acme/widgets".parse::<StatusKey>().is_err());
    }
}
