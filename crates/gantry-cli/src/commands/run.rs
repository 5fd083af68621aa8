//! Local manifest execution command.

use anyhow::{Context, Result};
use gantry_config::{BuildEnvironmentBuilder, SystemConfig, manifest};
use gantry_core::BuildResult;
use gantry_executor::ShellExecutor;
use gantry_scheduler::PipelineRunner;
use std::path::Path;
use std::sync::Arc;

/// Run the manifest in `dir` for `branch` and print the build log.
pub async fn run_local(config: &SystemConfig, dir: &Path, branch: &str, commit: &str) -> Result<()> {
    let result = execute(config, dir, branch, commit).await?;

    for line in &result.log {
        println!("{}", line);
    }
    println!("\n{}", result.tagline());

    if result.ok {
        Ok(())
    } else {
        anyhow::bail!("Build failed");
    }
}

async fn execute(config: &SystemConfig, dir: &Path, branch: &str, commit: &str) -> Result<BuildResult> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve directory: {}", dir.display()))?;

    let blocks = manifest::load(&dir, &config.workers.manifest, branch)
        .with_context(|| format!("Failed to load manifest from {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), branch, blocks = blocks.len(), "Running manifest");

    let env = BuildEnvironmentBuilder::new()
        .with_commit(commit)
        .with_branch(branch)
        .with_host(config.host.as_deref())
        .build();

    let executor = Arc::new(ShellExecutor::with_timeout(config.workers.step_timeout));
    let runner = PipelineRunner::new(executor);
    Ok(runner.execute(commit, &blocks, &dir, &env).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, text: &str) {
        std::fs::write(dir.join(gantry_config::DEFAULT_MANIFEST), text).unwrap();
    }

    #[tokio::test]
    async fn test_local_run_threads_branch_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"
"feature/*":
  step: check
  debug: 1
  shell: echo "$BRANCH $COMMIT_SHORT"
"#,
        );

        let result = execute(&SystemConfig::default(), dir.path(), "feature/x", "0123456789abcdef")
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.log[0], "- check");
        assert!(result.log.iter().any(|l| l.contains("feature/x 0123456789")));
    }

    #[tokio::test]
    async fn test_local_run_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"
- step: broken
  shell:
    - "false"
    - echo never
"#,
        );

        let config = SystemConfig::default();
        let result = execute(&config, dir.path(), "master", "local").await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.log.last().unwrap(), "[skipped] echo never");

        assert!(run_local(&config, dir.path(), "master", "local").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(&SystemConfig::default(), dir.path(), "master", "local")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("integration.yml"));
    }
}
