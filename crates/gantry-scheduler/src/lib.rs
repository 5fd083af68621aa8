//! Build scheduling for Gantry.
//!
//! Routes build requests to shard queues and runs one worker loop per
//! shard. Each loop materializes the repository, loads its manifest,
//! runs the pipeline and publishes the result.

pub mod backend;
pub mod cache;
pub mod dispatch;
pub mod queue;
pub mod runner;
pub mod worker;

pub use backend::Backend;
pub use cache::{GitCli, RepositoryCache};
pub use dispatch::{DispatchError, Dispatcher, shard_for};
pub use queue::{MemoryShardQueue, PgShardQueue};
pub use runner::PipelineRunner;
pub use worker::{Worker, WorkerContext, WorkerError, WorkerMonitor, WorkerPool, WorkerState};
