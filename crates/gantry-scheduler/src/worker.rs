//! Worker loop: one per shard, strictly sequential builds.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use gantry_config::{BuildEnvironmentBuilder, SystemConfig, manifest};
use gantry_core::queue::{QueueEntry, ShardQueue, queue_key};
use gantry_core::store::StatusStore;
use gantry_core::{BuildFailure, BuildRequest, BuildResult, StatusKey};
use gantry_executor::ShellExecutor;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::cache::{GitCli, RepositoryCache};
use crate::runner::PipelineRunner;

/// Errors that stop a worker. Anything else ends up in a build result.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("unable to create cache root {path}: {source}")]
    CacheRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("queue unavailable: {0}")]
    Queue(#[source] gantry_core::Error),

    #[error("status store unavailable: {0}")]
    Store(#[source] gantry_core::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Fetching,
    Building,
    Publishing,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Fetching => "fetching",
            WorkerState::Building => "building",
            WorkerState::Publishing => "publishing",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a worker needs, built once at startup.
pub struct WorkerContext {
    pub queue: Arc<dyn ShardQueue>,
    pub store: StatusStore,
    pub cache: RepositoryCache,
    pub runner: PipelineRunner,
    pub config: Arc<SystemConfig>,
}

impl WorkerContext {
    /// Wire the production git and shell backends from `config`.
    pub fn new(config: Arc<SystemConfig>, backend: &Backend) -> Self {
        let vcs = Arc::new(GitCli::new(config.git.clone()));
        let executor = Arc::new(ShellExecutor::with_timeout(config.workers.step_timeout));
        Self {
            queue: backend.queue.clone(),
            store: backend.store.clone(),
            cache: RepositoryCache::new(config.workers.cache_dir.clone(), vcs),
            runner: PipelineRunner::new(executor),
            config,
        }
    }
}

/// Consumes one shard queue.
pub struct Worker {
    shard: u32,
    ctx: Arc<WorkerContext>,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(shard: u32, ctx: Arc<WorkerContext>) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self { shard, ctx, state }
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run until a fatal error.
    pub async fn run(&self) -> Result<(), WorkerError> {
        self.ctx
            .cache
            .ensure_root()
            .await
            .map_err(|source| WorkerError::CacheRoot {
                path: self.ctx.cache.root().display().to_string(),
                source,
            })?;

        let queue = queue_key(self.shard);
        info!(shard = self.shard, queue = %queue, "Starting worker");

        loop {
            self.process_next(&queue).await?;
        }
    }

    /// Pop one entry from `queue`, build it and publish the result.
    ///
    /// Returns `None` when the entry held nothing buildable.
    pub async fn process_next(
        &self,
        queue: &str,
    ) -> Result<Option<(StatusKey, BuildResult)>, WorkerError> {
        self.set_state(WorkerState::Idle);
        let raw = self.ctx.queue.pop(queue).await.map_err(WorkerError::Queue)?;
        let started = Instant::now();

        let Some(request) = self.resolve(&raw).await? else {
            return Ok(None);
        };
        info!(
            build_id = %request.id,
            shard = self.shard,
            repo = %request.repository,
            branch = %request.branch,
            sha = %request.short_sha(),
            "Build started"
        );

        let mut result = match AssertUnwindSafe(self.build(&request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(build_id = %request.id, detail = %detail, "Build panicked");
                BuildResult::aborted(&request.sha, &BuildFailure::UnexpectedFailure(detail), 0)
            }
        };
        result.seconds = started.elapsed().as_secs();

        self.set_state(WorkerState::Publishing);
        let key = request.key();
        self.ctx
            .store
            .put_result(&key, &result)
            .await
            .map_err(WorkerError::Store)?;
        self.set_state(WorkerState::Idle);

        info!(
            build_id = %request.id,
            key = %key,
            ok = result.ok,
            seconds = result.seconds,
            "Build finished"
        );
        Ok(Some((key, result)))
    }

    async fn resolve(&self, raw: &str) -> Result<Option<BuildRequest>, WorkerError> {
        let key = match QueueEntry::decode(raw) {
            Ok(QueueEntry::Request(request)) => return Ok(Some(request)),
            Ok(QueueEntry::Key(key)) => key,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable queue entry");
                return Ok(None);
            }
        };

        let Ok(status_key) = key.parse::<StatusKey>() else {
            warn!(key = %key, "Dropping malformed queue key");
            return Ok(None);
        };
        let payload = match self.ctx.store.payload(&status_key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(key = %key, "No cached push payload for queued key");
                return Ok(None);
            }
            Err(gantry_core::Error::Serialization(e)) => {
                warn!(key = %key, error = %e, "Cached push payload is not JSON");
                return Ok(None);
            }
            Err(e) => return Err(WorkerError::Store(e)),
        };

        match BuildRequest::from_push_payload(&payload) {
            Ok(request) => Ok(request),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached push payload is unusable");
                Ok(None)
            }
        }
    }

    async fn build(&self, request: &BuildRequest) -> BuildResult {
        self.set_state(WorkerState::Fetching);
        let checkout = match self.ctx.cache.materialize(request).await {
            Ok(path) => path,
            Err(e) => {
                warn!(build_id = %request.id, error = %e, "Unable to materialize repository");
                return BuildResult::aborted(&request.sha, &e.failure(), 0);
            }
        };

        self.set_state(WorkerState::Building);
        let config = &self.ctx.config;
        let blocks = match manifest::load(&checkout, &config.workers.manifest, &request.branch) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(build_id = %request.id, error = %e, "Unable to load manifest");
                return BuildResult::aborted(&request.sha, &e.failure(), 0);
            }
        };

        let callback = config.callback_url(&uuid::Uuid::new_v4().to_string());
        let env = BuildEnvironmentBuilder::for_request(request)
            .with_host(config.host.as_deref())
            .with_callback(callback)
            .build();

        self.ctx
            .runner
            .execute(&request.sha, &blocks, &checkout, &env)
            .await
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Read-only view of every worker's state.
#[derive(Clone, Default)]
pub struct WorkerMonitor {
    states: Arc<Vec<(u32, watch::Receiver<WorkerState>)>>,
}

impl WorkerMonitor {
    pub fn snapshot(&self) -> Vec<(u32, WorkerState)> {
        self.states
            .iter()
            .map(|(shard, rx)| (*shard, *rx.borrow()))
            .collect()
    }
}

/// A set of running workers.
pub struct WorkerPool {
    tasks: JoinSet<Result<(), WorkerError>>,
    monitor: WorkerMonitor,
}

impl WorkerPool {
    /// Spawn one worker task per shard.
    pub fn spawn(ctx: Arc<WorkerContext>, shards: impl IntoIterator<Item = u32>) -> Self {
        let mut tasks = JoinSet::new();
        let mut states = Vec::new();

        for shard in shards {
            let worker = Worker::new(shard, ctx.clone());
            states.push((shard, worker.subscribe()));
            tasks.spawn(async move {
                let outcome = worker.run().await;
                if let Err(e) = &outcome {
                    error!(shard = worker.shard(), error = %e, "Worker stopped");
                }
                outcome
            });
        }

        Self {
            tasks,
            monitor: WorkerMonitor {
                states: Arc::new(states),
            },
        }
    }

    pub fn monitor(&self) -> WorkerMonitor {
        self.monitor.clone()
    }

    /// Wait for the first worker to stop; its error is returned.
    pub async fn wait(mut self) -> Result<(), WorkerError> {
        while let Some(joined) = self.tasks.join_next().await {
            joined??;
        }
        Ok(())
    }
}
