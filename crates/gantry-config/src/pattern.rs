//! Shell-style branch patterns.
//!
//! `*` matches any run of characters (slashes included), `?` matches one
//! character, `[seq]` and `[!seq]` match one character in or out of a set.
//! A pattern that does not parse, such as an unterminated `[`, only matches
//! itself.

use glob::Pattern;

/// A compiled branch glob.
#[derive(Debug, Clone)]
pub struct BranchPattern {
    raw: String,
    pattern: Option<Pattern>,
}

impl BranchPattern {
    pub fn new(raw: &str) -> Self {
        let pattern = match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = raw, error = %e, "branch pattern does not parse, matching literally");
                None
            }
        };
        Self {
            raw: raw.to_string(),
            pattern,
        }
    }

    pub fn matches(&self, branch: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches(branch),
            None => self.raw == branch,
        }
    }
}
