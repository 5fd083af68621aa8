//! Build requests and push payload parsing.

use serde::{Deserialize, Serialize};

use crate::{BuildId, Error, Result, StatusKey};

/// Length of the abbreviated commit id used in logs, badges and `COMMIT_SHORT`.
pub const SHORT_SHA_LEN: usize = 10;

const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// A request to build one commit of one repository.
///
/// Created by the webhook (or a rebuild request), serialized onto a shard
/// queue and consumed by exactly one worker iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub id: BuildId,
    /// Repository full name, e.g. `acme/widgets`.
    pub repository: String,
    /// Remote URL the repository cache clones from.
    pub git_url: String,
    pub branch: String,
    pub sha: String,
    pub message: String,
    pub timestamp: String,
    /// Wipe the cached working copy before fetching.
    #[serde(default)]
    pub reset: bool,
}

impl BuildRequest {
    /// Parse a GitHub push webhook payload.
    ///
    /// Returns `Ok(None)` for pushes that carry nothing to build: branch
    /// deletions, an all-zero `after`, or an empty commit list.
    pub fn from_push_payload(payload: &serde_json::Value) -> Result<Option<Self>> {
        if payload.get("deleted").and_then(|d| d.as_bool()) == Some(true) {
            return Ok(None);
        }

        let r#ref = required_str(payload, "ref")?;
        let sha = required_str(payload, "after")?;
        if sha.chars().all(|c| c == '0') {
            return Ok(None);
        }

        let repository = payload
            .get("repository")
            .ok_or_else(|| Error::InvalidInput("push payload has no repository".to_string()))?;
        let full_name = required_str(repository, "full_name")?;
        let git_url = clone_url(repository).ok_or_else(|| {
            Error::InvalidInput(format!("no clone url for repository {}", full_name))
        })?;

        let commit = payload
            .get("commits")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .or_else(|| payload.get("head_commit").filter(|c| !c.is_null()));
        let Some(commit) = commit else {
            return Ok(None);
        };

        let message = commit
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        let timestamp = commit
            .get("timestamp")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Some(BuildRequest {
            id: BuildId::new(),
            repository: full_name.to_string(),
            git_url,
            branch: branch_from_ref(r#ref).to_string(),
            sha: sha.to_string(),
            message,
            timestamp,
            reset: false,
        }))
    }

    /// The `{branch}:{repository}` key this build reports under.
    pub fn key(&self) -> StatusKey {
        StatusKey::new(&self.branch, &self.repository)
    }

    /// First ten characters of the commit id.
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

/// Abbreviate a commit id to `SHORT_SHA_LEN` characters.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(SHORT_SHA_LEN) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

/// `refs/heads/main` -> `main`; any other ref keeps its last path segment.
pub fn branch_from_ref(r#ref: &str) -> &str {
    if let Some(branch) = r#ref.strip_prefix("refs/heads/") {
        return branch;
    }
    r#ref.rsplit('/').next().unwrap_or(r#ref)
}

fn required_str<'a>(value: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidInput(format!("push payload is missing \"{}\"", field)))
}

fn clone_url(repository: &serde_json::Value) -> Option<String> {
    if let Some(url) = repository.get("clone_url").and_then(|u| u.as_str()) {
        return Some(url.to_string());
    }
    // git://github.com/acme/widgets.git
    let git_url = repository.get("git_url").and_then(|u| u.as_str())?;
    Some(match git_url.strip_prefix("git://") {
        Some(rest) => format!("https://{}", rest),
        None => git_url.to_string(),
    })
}
