//! Sticky routing of build requests onto shard queues.
//!
//! A repository always lands on the same shard for a fixed shard count,
//! so its builds run in order and its cached working copy is only ever
//! touched by one worker. Changing the shard count remaps repositories;
//! working copies left behind on the old shard are simply re-cloned.

use std::sync::Arc;

use gantry_core::BuildRequest;
use gantry_core::queue::{QueueEntry, ShardQueue, queue_key};
use thiserror::Error;
use tracing::info;

/// Errors that can occur during dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No shards are configured.
    #[error("no worker shards configured")]
    NoCapacity,

    /// The queue backend rejected the push.
    #[error("queue error: {0}")]
    Queue(#[from] gantry_core::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// MD5 of the repository name, first eight bytes big-endian.
pub fn stable_hash(repository: &str) -> u64 {
    let digest = md5::compute(repository.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(bytes)
}

/// Shard a repository routes to, or `None` with zero shards.
pub fn shard_for(repository: &str, shards: u32) -> Option<u32> {
    if shards == 0 {
        return None;
    }
    // The remainder is < shards, so it always fits.
    Some((stable_hash(repository) % u64::from(shards)) as u32)
}

/// Pushes build requests onto their repository's shard queue.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn ShardQueue>,
    shards: u32,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn ShardQueue>, shards: u32) -> Self {
        Self { queue, shards }
    }

    pub fn shards(&self) -> u32 {
        self.shards
    }

    pub fn backend(&self) -> &'static str {
        self.queue.backend()
    }

    /// Enqueue `request` and return the shard it went to.
    pub async fn dispatch(&self, request: &BuildRequest) -> Result<u32> {
        let shard = shard_for(&request.repository, self.shards).ok_or(DispatchError::NoCapacity)?;
        let payload = QueueEntry::Request(request.clone()).encode()?;
        self.queue.push(&queue_key(shard), payload).await?;

        info!(
            build_id = %request.id,
            repo = %request.repository,
            branch = %request.branch,
            sha = %request.short_sha(),
            shard,
            "Build queued"
        );
        Ok(shard)
    }
}
