//! Step blocks, the unit a pipeline is built from.

use serde::Serialize;

/// Prefix marking a shell line that runs even after an earlier failure.
pub const NO_SKIP: &str = "no-skip";

/// One labelled group of shell lines from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepBlock {
    pub label: String,
    /// Working directory relative to the checkout root.
    pub cwd: Option<String>,
    /// Echo each line of captured output into the build log.
    pub debug: bool,
    pub shell: Vec<String>,
}

impl StepBlock {
    pub fn new(label: impl Into<String>, shell: Vec<String>) -> Self {
        Self {
            label: label.into(),
            cwd: None,
            debug: false,
            shell,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Split a shell line into its always-run flag and the command to execute.
///
/// `no-skip make clean` -> `(true, "make clean")`. The token only counts
/// when followed by whitespace, so `no-skipper` is an ordinary command.
pub fn split_no_skip(line: &str) -> (bool, &str) {
    match line.strip_prefix(NO_SKIP) {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim_start()),
        _ => (false, line),
    }
}
