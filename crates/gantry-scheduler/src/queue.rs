//! Shard queue backends.

use async_trait::async_trait;
use gantry_core::queue::ShardQueue;
use gantry_core::{Error, Result};
use sqlx::PgPool;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

#[derive(Default)]
struct Lane {
    items: VecDeque<String>,
    ready: Arc<Notify>,
}

/// In-process FIFO queues, one per key.
#[derive(Default)]
pub struct MemoryShardQueue {
    lanes: Mutex<HashMap<String, Lane>>,
}

impl MemoryShardQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries waiting on `queue`.
    pub async fn len(&self, queue: &str) -> usize {
        self.lanes
            .lock()
            .await
            .get(queue)
            .map(|lane| lane.items.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ShardQueue for MemoryShardQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(queue.to_string()).or_default();
        lane.items.push_back(payload);
        lane.ready.notify_one();
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<String> {
        loop {
            let ready = {
                let mut lanes = self.lanes.lock().await;
                let lane = lanes.entry(queue.to_string()).or_default();
                if let Some(item) = lane.items.pop_front() {
                    return Ok(item);
                }
                lane.ready.clone()
            };
            // notify_one stores a permit, so a push racing this wait is not lost.
            ready.notified().await;
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// `build_queue` table polled with `FOR UPDATE SKIP LOCKED`.
pub struct PgShardQueue {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgShardQueue {
    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// Claim and remove the oldest entry of `queue`, if any.
    pub async fn claim(&self, queue: &str) -> std::result::Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            DELETE FROM build_queue
            WHERE id = (
                SELECT id FROM build_queue
                WHERE queue_key = $1
                ORDER BY created_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl ShardQueue for PgShardQueue {
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO build_queue (id, queue_key, payload, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(queue)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<String> {
        loop {
            match self.claim(queue).await {
                Ok(Some(payload)) => return Ok(payload),
                Ok(None) => sleep(self.poll_interval).await,
                Err(e) => return Err(Error::Queue(e.to_string())),
            }
        }
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
