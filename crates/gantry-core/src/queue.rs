//! Shard queue trait and queue entry encoding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{BuildRequest, Result};

/// Name of the queue a shard consumes.
pub fn queue_key(shard: u32) -> String {
    format!("queue-{}", shard)
}

/// FIFO queues addressed by key.
#[async_trait]
pub trait ShardQueue: Send + Sync {
    /// Append `payload` to the tail of `queue`.
    async fn push(&self, queue: &str, payload: String) -> Result<()>;

    /// Remove the head of `queue`, waiting until one is available.
    async fn pop(&self, queue: &str) -> Result<String>;

    fn backend(&self) -> &'static str;
}

/// What a worker can find on its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Request(BuildRequest),
    /// Legacy entry: a bare `{branch}:{repository}` key whose push payload
    /// must be looked up in the store.
    Key(String),
}

impl QueueEntry {
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
