//! Standalone worker command.

use anyhow::{Context, Result};
use gantry_config::SystemConfig;
use gantry_scheduler::{Backend, WorkerContext, WorkerPool};
use std::sync::Arc;
use tracing::info;

/// Run one worker per selected shard until interrupted or a worker stops.
pub async fn run(config: SystemConfig, only: Vec<u32>) -> Result<()> {
    let shards = select_shards(config.workers.shards, only)?;

    let backend = Backend::from_config(&config)
        .await
        .context("Failed to open the queue backend")?;
    if !backend.is_shared() {
        anyhow::bail!("A standalone worker needs a shared queue (set --database-url)");
    }

    info!(shards = ?shards, cache = %config.workers.cache_dir.display(), "Starting workers");
    let ctx = Arc::new(WorkerContext::new(Arc::new(config), &backend));
    let pool = WorkerPool::spawn(ctx, shards);

    tokio::select! {
        outcome = pool.wait() => outcome.context("Worker stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(())
}

fn select_shards(total: u32, only: Vec<u32>) -> Result<Vec<u32>> {
    if total == 0 {
        anyhow::bail!("No shards configured (use --shards)");
    }
    if only.is_empty() {
        return Ok((0..total).collect());
    }
    if let Some(bad) = only.iter().find(|&&shard| shard >= total) {
        anyhow::bail!("Shard {} is out of range (0..{})", bad, total);
    }
    let mut shards = only;
    shards.sort_unstable();
    shards.dedup();
    Ok(shards)
}
