//! Environment exported to build steps.
//!
//! Every step sees:
//! - `COMMIT` / `COMMIT_SHORT` - full and 10-char commit id
//! - `MESSAGE` - commit message
//! - `TAG` - repository full name
//! - `TIMESTAMP` - commit timestamp as sent by the push
//! - `BRANCH` - branch being built
//! - `HOST` - worker host name, when configured
//! - `CALLBACK` - rendezvous URL, when a public URL is configured
//! - `LOG` - the tail of the build log so far, newline separated
//! - `OK` - `true` while no step has failed, absent afterwards

use std::collections::HashMap;

use gantry_core::BuildRequest;
use gantry_core::build::short_sha;

pub const LOG_VAR: &str = "LOG";
pub const OK_VAR: &str = "OK";

/// Size cap for `LOG`. Linux refuses to exec with any single environment
/// string over 128 KiB.
pub const LOG_TAIL_BYTES: usize = 64 * 1024;

/// Builder for the base environment of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildEnvironmentBuilder {
    vars: HashMap<String, String>,
}

impl BuildEnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the commit variables from a build request.
    pub fn for_request(request: &BuildRequest) -> Self {
        Self::new()
            .with_commit(&request.sha)
            .with_message(&request.message)
            .with_tag(&request.repository)
            .with_timestamp(&request.timestamp)
            .with_branch(&request.branch)
    }

    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        self.vars
            .insert("COMMIT_SHORT".to_string(), short_sha(&sha).to_string());
        self.vars.insert("COMMIT".to_string(), sha);
        self
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        self.with_var("MESSAGE", message)
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.with_var("TAG", tag)
    }

    pub fn with_timestamp(self, timestamp: impl Into<String>) -> Self {
        self.with_var("TIMESTAMP", timestamp)
    }

    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        self.with_var("BRANCH", branch)
    }

    pub fn with_host(self, host: Option<&str>) -> Self {
        match host {
            Some(host) => self.with_var("HOST", host),
            None => self,
        }
    }

    pub fn with_callback(self, url: Option<String>) -> Self {
        match url {
            Some(url) => self.with_var("CALLBACK", url),
            None => self,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> HashMap<String, String> {
        self.vars
    }
}

/// The environment for one step: `base` plus the current `LOG` and `OK`.
pub fn step_environment(
    base: &HashMap<String, String>,
    log: &[String],
    ok: bool,
) -> HashMap<String, String> {
    let mut env = base.clone();
    env.insert(LOG_VAR.to_string(), log_tail(log, LOG_TAIL_BYTES));
    if ok {
        env.insert(OK_VAR.to_string(), "true".to_string());
    } else {
        env.remove(OK_VAR);
    }
    env
}

/// The most recent log lines that fit in `limit` bytes once joined.
///
/// Cuts on a line boundary, unless the last line alone is over the limit,
/// in which case its end is kept.
pub fn log_tail(log: &[String], limit: usize) -> String {
    let mut start = log.len();
    let mut size = 0;
    while start > 0 {
        let separator = usize::from(start < log.len());
        let len = log[start - 1].len() + separator;
        if size + len > limit {
            break;
        }
        size += len;
        start -= 1;
    }

    if start == log.len() {
        let Some(last) = log.last() else {
            return String::new();
        };
        let mut cut = last.len().saturating_sub(limit);
        while !last.is_char_boundary(cut) {
            cut += 1;
        }
        return last[cut..].to_string();
    }
    log[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_variables() {
        let env = BuildEnvironmentBuilder::new()
            .with_commit("ab12cd34ef56ab12cd34")
            .with_branch("main")
            .with_tag("acme/widgets")
            .build();
        assert_eq!(env["COMMIT"], "ab12cd34ef56ab12cd34");
        assert_eq!(env["COMMIT_SHORT"], "ab12cd34ef");
        assert_eq!(env["BRANCH"], "main");
        assert_eq!(env["TAG"], "acme/widgets");
    }

    #[test]
    fn test_optional_variables() {
        let env = BuildEnvironmentBuilder::new()
            .with_host(None)
            .with_callback(None)
            .build();
        assert!(!env.contains_key("HOST"));
        assert!(!env.contains_key("CALLBACK"));

        let env = BuildEnvironmentBuilder::new()
            .with_host(Some("ci-01"))
            .with_callback(Some("http://ci/callback/1".to_string()))
            .build();
        assert_eq!(env["HOST"], "ci-01");
        assert_eq!(env["CALLBACK"], "http://ci/callback/1");
    }

    #[test]
    fn test_step_environment() {
        let base = BuildEnvironmentBuilder::new().with_branch("main").build();
        let log = vec!["- build".to_string(), "[passed] make (0s)".to_string()];

        let env = step_environment(&base, &log, true);
        assert_eq!(env[LOG_VAR], "- build\n[passed] make (0s)");
        assert_eq!(env[OK_VAR], "true");
        assert_eq!(env["BRANCH"], "main");

        let env = step_environment(&base, &log, false);
        assert!(!env.contains_key(OK_VAR));
    }

    #[test]
    fn test_log_tail_keeps_whole_recent_lines() {
        let log: Vec<String> = ["aaaa", "bbbb", "cccc"].iter().map(|l| l.to_string()).collect();
        assert_eq!(log_tail(&log, 100), "aaaa\nbbbb\ncccc");
        assert_eq!(log_tail(&log, 9), "bbbb\ncccc");
        assert_eq!(log_tail(&log, 8), "cccc");
        assert_eq!(log_tail(&log, 2), "cc");
        assert_eq!(log_tail(&[], 10), "");
    }

    #[test]
    fn test_log_tail_respects_char_boundaries() {
        let log = vec!["h\u{e9}llo".to_string()];
        assert_eq!(log_tail(&log, 4), "llo");
    }

    #[test]
    fn test_large_log_is_capped() {
        let log: Vec<String> = (0..100_000).map(|i| format!("[passed]   . {}", i)).collect();
        let env = step_environment(&HashMap::new(), &log, true);
        assert!(env[LOG_VAR].len() <= LOG_TAIL_BYTES);
        assert!(env[LOG_VAR].ends_with("[passed]   . 99999"));
    }
}
