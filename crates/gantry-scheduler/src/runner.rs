//! Pipeline runner - executes step blocks in order with sticky failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use gantry_config::environment::step_environment;
use gantry_core::executor::{SIGNAL_EXIT_CODE, StepExecutor};
use gantry_core::pipeline::split_no_skip;
use gantry_core::{BuildFailure, BuildResult, Error, StepBlock};
use tracing::{debug, info};

/// Mutable state of one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Starts true; the first failing step flips it for good.
    pub ok: bool,
    pub log: Vec<String>,
    /// Every step that did not succeed, in run order.
    pub failures: Vec<BuildFailure>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            ok: true,
            log: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl ExecutionState {
    fn fail(&mut self, failure: BuildFailure) {
        self.ok = false;
        self.failures.push(failure);
    }
}

/// Runs step blocks through a `StepExecutor`.
pub struct PipelineRunner {
    executor: Arc<dyn StepExecutor>,
}

impl PipelineRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }

    /// Run `blocks` against the tree at `checkout` and wrap the outcome
    /// as the result for `sha`.
    pub async fn execute(
        &self,
        sha: &str,
        blocks: &[StepBlock],
        checkout: &Path,
        base_env: &HashMap<String, String>,
    ) -> BuildResult {
        let started = Instant::now();
        let state = self.run_blocks(blocks, checkout, base_env).await;

        BuildResult {
            ok: state.ok,
            sha: sha.to_string(),
            log: state.log,
            seconds: started.elapsed().as_secs(),
        }
    }

    /// After the first failure, plain lines are logged as skipped and only
    /// `no-skip` lines still run.
    pub async fn run_blocks(
        &self,
        blocks: &[StepBlock],
        checkout: &Path,
        base_env: &HashMap<String, String>,
    ) -> ExecutionState {
        let mut state = ExecutionState::default();

        for block in blocks {
            state.log.push(format!("- {}", block.label));
            let cwd = match &block.cwd {
                Some(dir) => checkout.join(dir),
                None => checkout.to_path_buf(),
            };

            for line in &block.shell {
                let (always_run, snippet) = split_no_skip(line);
                if !state.ok && !always_run {
                    state.log.push(format!("[skipped] {}", snippet));
                    continue;
                }
                self.run_line(&mut state, block, snippet, &cwd, base_env)
                    .await;
            }
        }

        state
    }

    async fn run_line(
        &self,
        state: &mut ExecutionState,
        block: &StepBlock,
        snippet: &str,
        cwd: &Path,
        base_env: &HashMap<String, String>,
    ) {
        let env = step_environment(base_env, &state.log, state.ok);
        let started = Instant::now();
        let outcome = self.executor.run(snippet, cwd, &env).await;
        let secs = started.elapsed().as_secs();

        match outcome {
            Ok(output) => {
                let status = if output.success() { "passed" } else { "failed" };
                for line in &output.lines {
                    debug!(step = %block.label, "{}", line);
                }
                state.log.push(format!("[{}] {} ({}s)", status, snippet, secs));
                if block.debug {
                    state.log.extend(
                        output
                            .lines
                            .iter()
                            .map(|line| format!("[{}]   . {}", status, line)),
                    );
                }
                if !output.success() {
                    info!(step = %block.label, snippet, exit_code = output.exit_code, "Step failed");
                    state.fail(BuildFailure::StepFailure {
                        snippet: snippet.to_string(),
                        code: output.exit_code,
                    });
                }
            }
            Err(e) => {
                let detail = match e {
                    Error::ExecutionFailed(detail) => detail,
                    other => other.to_string(),
                };
                info!(step = %block.label, snippet, error = %detail, "Step could not be started");
                state.log.push(format!("[failed] {} ({}s)", snippet, secs));
                state
                    .log
                    .push(format!("* unable to run \"{}\" -> {}", snippet, detail));
                state.fail(BuildFailure::StepFailure {
                    snippet: snippet.to_string(),
                    code: SIGNAL_EXIT_CODE,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_config::Manifest;
    use gantry_core::executor::StepOutput;
    use gantry_executor::ShellExecutor;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records every call; fails snippets containing "fail".
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, PathBuf, HashMap<String, String>)>>,
    }

    #[async_trait]
    impl StepExecutor for RecordingExecutor {
        async fn run(
            &self,
            snippet: &str,
            cwd: &Path,
            env: &HashMap<String, String>,
        ) -> gantry_core::Result<StepOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((snippet.to_string(), cwd.to_path_buf(), env.clone()));
            if snippet.contains("unrunnable") {
                return Err(Error::ExecutionFailed("No such file or directory".to_string()));
            }
            Ok(StepOutput {
                exit_code: if snippet.contains("fail") { 1 } else { 0 },
                lines: vec![format!("out of {}", snippet)],
            })
        }
    }

    fn block(label: &str, lines: &[&str]) -> StepBlock {
        StepBlock::new(label, lines.iter().map(|l| l.to_string()).collect())
    }

    #[tokio::test]
    async fn scenario_a_all_steps_pass() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(Arc::new(ShellExecutor::new()));
        let blocks = vec![block("build", &["true", "echo built"])];

        let result = runner
            .execute("abc", &blocks, dir.path(), &HashMap::new())
            .await;

        assert!(result.ok);
        assert_eq!(result.sha, "abc");
        assert_eq!(result.log[0], "- build");
        let passed: Vec<_> = result
            .log
            .iter()
            .filter(|l| l.starts_with("[passed]"))
            .collect();
        assert_eq!(passed.len(), 2);
        assert!(result.log[1].starts_with("[passed] true ("));
    }

    #[tokio::test]
    async fn scenario_b_failure_skips_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(Arc::new(ShellExecutor::new()));
        let blocks = vec![block("build", &["exit 2", "touch should-not-exist"])];

        let result = runner
            .execute("abc", &blocks, dir.path(), &HashMap::new())
            .await;

        assert!(!result.ok);
        assert!(result.log[1].starts_with("[failed] exit 2 ("));
        assert_eq!(result.log[2], "[skipped] touch should-not-exist");
        assert!(!dir.path().join("should-not-exist").exists());
    }

    #[tokio::test]
    async fn scenario_c_no_skip_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(Arc::new(ShellExecutor::new()));
        let blocks = vec![
            block("build", &["false"]),
            block("cleanup", &["no-skip touch cleaned", "no-skip false", "echo nope"]),
        ];

        let result = runner
            .execute("abc", &blocks, dir.path(), &HashMap::new())
            .await;

        assert!(!result.ok);
        assert!(dir.path().join("cleaned").exists());
        assert_eq!(result.log[2], "- cleanup");
        assert!(result.log[3].starts_with("[passed] touch cleaned ("));
        assert!(result.log[4].starts_with("[failed] false ("));
        assert_eq!(result.log[5], "[skipped] echo nope");
    }

    #[tokio::test]
    async fn scenario_e_keyed_manifest_selection() {
        let manifest = Manifest::parse(
            r#"
"release-*":
  step: package
  shell: make package
master:
  step: deploy
  shell: make deploy
"release-4?":
  - step: announce
    shell: [echo release]
"#,
        )
        .unwrap();
        let blocks = manifest.select("release-42");

        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());
        let result = runner
            .execute("abc", &blocks, Path::new("/checkout"), &HashMap::new())
            .await;

        assert!(result.ok);
        let labels: Vec<_> = result.log.iter().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(labels, vec!["- package", "- announce"]);
        let snippets: Vec<_> = executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _, _)| s.clone())
            .collect();
        assert_eq!(snippets, vec!["make package", "echo release"]);
    }

    #[tokio::test]
    async fn test_environment_threading() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());
        let mut base = HashMap::new();
        base.insert("BRANCH".to_string(), "main".to_string());
        let blocks = vec![block("build", &["first", "fail here", "no-skip last"])];

        runner
            .execute("abc", &blocks, Path::new("/checkout"), &base)
            .await;

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);

        let (_, _, env) = &calls[0];
        assert_eq!(env["BRANCH"], "main");
        assert_eq!(env["OK"], "true");
        assert_eq!(env["LOG"], "- build");

        let (_, _, env) = &calls[1];
        assert!(env["LOG"].ends_with("[passed] first (0s)"));

        let (snippet, _, env) = &calls[2];
        assert_eq!(snippet, "last");
        assert!(!env.contains_key("OK"));
    }

    #[tokio::test]
    async fn test_debug_output_and_cwd() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());
        let blocks = vec![
            block("lint", &["lint"]).with_cwd("src").with_debug(true),
            block("quiet", &["test"]),
        ];

        let result = runner
            .execute("abc", &blocks, Path::new("/checkout"), &HashMap::new())
            .await;

        assert_eq!(result.log[1], "[passed] lint (0s)");
        assert_eq!(result.log[2], "[passed]   . out of lint");
        assert_eq!(result.log[3], "- quiet");
        assert_eq!(result.log.len(), 5);

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0].1, PathBuf::from("/checkout/src"));
        assert_eq!(calls[1].1, PathBuf::from("/checkout"));
    }

    #[tokio::test]
    async fn test_spawn_error_counts_as_failure() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor);
        let blocks = vec![block("build", &["unrunnable", "after"])];

        let result = runner
            .execute("abc", &blocks, Path::new("/checkout"), &HashMap::new())
            .await;

        assert!(!result.ok);
        assert_eq!(result.log[1], "[failed] unrunnable (0s)");
        assert_eq!(
            result.log[2],
            "* unable to run \"unrunnable\" -> No such file or directory"
        );
        assert_eq!(result.log[3], "[skipped] after");
    }

    #[tokio::test]
    async fn test_failures_are_recorded_as_step_failures() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor);
        let blocks = vec![block("build", &["first", "fail here", "no-skip unrunnable"])];

        let state = runner
            .run_blocks(&blocks, Path::new("/checkout"), &HashMap::new())
            .await;

        assert!(!state.ok);
        assert_eq!(
            state.failures,
            vec![
                BuildFailure::StepFailure {
                    snippet: "fail here".to_string(),
                    code: 1,
                },
                BuildFailure::StepFailure {
                    snippet: "unrunnable".to_string(),
                    code: SIGNAL_EXIT_CODE,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_noisy_debug_block_does_not_starve_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(Arc::new(ShellExecutor::new()));
        let blocks = vec![
            block("noisy", &["seq 1 40000"]).with_debug(true),
            block("cleanup", &["no-skip touch cleaned"]),
        ];

        let result = runner
            .execute("abc", &blocks, dir.path(), &HashMap::new())
            .await;

        assert!(result.ok, "{:?}", result.log.last());
        assert!(dir.path().join("cleaned").exists());
        assert!(result.log.last().unwrap().starts_with("[passed] touch cleaned ("));
    }
}
