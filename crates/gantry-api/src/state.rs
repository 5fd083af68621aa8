//! Application state.

use gantry_config::SystemConfig;
use gantry_core::executor::StepExecutor;
use gantry_core::store::StatusStore;
use gantry_executor::ShellExecutor;
use gantry_scheduler::{Backend, Dispatcher, WorkerMonitor};
use std::sync::Arc;

use crate::callback::WaitRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SystemConfig>,
    pub dispatcher: Dispatcher,
    pub store: StatusStore,
    pub callbacks: Arc<WaitRegistry>,
    pub workers: WorkerMonitor,
    /// Runs uploaded scripts for `/run`.
    pub scripts: Arc<dyn StepExecutor>,
}

impl AppState {
    pub fn new(config: Arc<SystemConfig>, backend: &Backend, workers: WorkerMonitor) -> Self {
        Self {
            dispatcher: Dispatcher::new(backend.queue.clone(), config.workers.shards),
            store: backend.store.clone(),
            callbacks: Arc::new(WaitRegistry::new(config.callback_timeout)),
            workers,
            scripts: Arc::new(ShellExecutor::with_timeout(config.workers.step_timeout)),
            config,
        }
    }
}
