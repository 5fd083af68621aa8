//! Step executor trait.
//!
//! A step executor runs one shell snippet and reports its exit code and
//! captured output.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::Result;

/// Exit code reported when a step is killed by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Exit code reported when a step exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Outcome of one executed shell snippet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOutput {
    pub exit_code: i32,
    /// Interleaved stdout and stderr lines, in arrival order.
    pub lines: Vec<String>,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `snippet` in `cwd` with `env` overlaid on the process environment.
    ///
    /// Returns `Err` only when the process cannot be started; a non-zero
    /// exit is a normal `StepOutput`.
    async fn run(
        &self,
        snippet: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<StepOutput>;
}
