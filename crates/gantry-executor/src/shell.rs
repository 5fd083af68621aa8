//! Local shell step executor.

use async_trait::async_trait;
use gantry_core::executor::{SIGNAL_EXIT_CODE, StepExecutor, StepOutput, TIMEOUT_EXIT_CODE};
use gantry_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runs snippets through `sh -c` with stdout and stderr merged line by line.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill steps that run longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn run(
        &self,
        snippet: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
    ) -> Result<StepOutput> {
        debug!(snippet, cwd = %cwd.display(), "spawning step");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(snippet)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExecutionFailed(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        let wait = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
                None => Some(child.wait().await),
            }
        };

        let waited = wait.await;
        let (exit_code, timed_out) = match waited {
            Some(Ok(status)) => (status.code().unwrap_or(SIGNAL_EXIT_CODE), false),
            Some(Err(e)) => {
                warn!(error = %e, "failed to wait on step");
                (SIGNAL_EXIT_CODE, false)
            }
            None => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out step");
                }
                // Grandchildren may still hold the pipes open.
                for reader in &readers {
                    reader.abort();
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }

        if timed_out {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            lines.push(format!("timed out after {}s", secs));
        }

        Ok(StepOutput { exit_code, lines })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "error reading step output");
                break;
            }
        }
    }
}
