//! Queue and store backend selection.

use std::sync::Arc;

use gantry_config::SystemConfig;
use gantry_core::queue::ShardQueue;
use gantry_core::store::{KeyValueStore, StatusStore};
use gantry_db::{DbResult, MemoryStore, PgStore, create_pool, run_migrations};
use tracing::info;

use crate::queue::{MemoryShardQueue, PgShardQueue};

/// The shard queue and status store a process talks to.
#[derive(Clone)]
pub struct Backend {
    pub queue: Arc<dyn ShardQueue>,
    pub store: StatusStore,
}

impl Backend {
    /// Process-local queue and store.
    pub fn memory() -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        Self {
            queue: Arc::new(MemoryShardQueue::new()),
            store: StatusStore::new(store),
        }
    }

    /// PostgreSQL queue and store, migrating the schema first.
    pub async fn postgres(database_url: &str, config: &SystemConfig) -> DbResult<Self> {
        info!("Connecting to database...");
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        info!("Database connected");

        Ok(Self {
            queue: Arc::new(PgShardQueue::new(
                pool.clone(),
                config.workers.poll_interval,
            )),
            store: StatusStore::new(Arc::new(PgStore::new(pool))),
        })
    }

    /// PostgreSQL when a database URL is configured, memory otherwise.
    pub async fn from_config(config: &SystemConfig) -> DbResult<Self> {
        match &config.database_url {
            Some(url) => Self::postgres(url, config).await,
            None => Ok(Self::memory()),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.queue.backend() != "memory"
    }
}
