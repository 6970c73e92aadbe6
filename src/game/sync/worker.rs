//! Task execution strategies
//!
//! A [`ProtocolWorker`] receives the independent tasks of one phase and must
//! run every one of them before `execute` returns. The return of `execute` is
//! the phase barrier.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::error::ConfigError;

/// One unit of work; borrows tick state for the duration of `execute`
pub type Task<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Runs a batch of tasks to completion
pub trait ProtocolWorker: Send + Sync {
    /// Run every task exactly once, returning when all have finished
    fn execute(&self, tasks: Vec<Task<'_>>);

    fn name(&self) -> &'static str;
}

/// Runs tasks one after another on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialWorker;

impl ProtocolWorker for SerialWorker {
    fn execute(&self, tasks: Vec<Task<'_>>) {
        for task in tasks {
            task();
        }
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

/// Fans tasks out over a dedicated rayon thread pool
pub struct RayonWorker {
    pool: ThreadPool,
}

impl RayonWorker {
    /// Build a pool with `threads` workers (0 = one per core)
    pub fn new(threads: usize) -> Result<Self, ConfigError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("info-sync-{i}"))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to build worker pool: {e}")))?;

        info!(threads = pool.current_num_threads(), "Sync worker pool started");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ProtocolWorker for RayonWorker {
    fn execute(&self, tasks: Vec<Task<'_>>) {
        if tasks.is_empty() {
            return;
        }
        self.pool
            .install(|| tasks.into_par_iter().for_each(|task| task()));
    }

    fn name(&self) -> &'static str {
        "rayon"
    }
}

impl std::fmt::Debug for RayonWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonWorker")
            .field("threads", &self.threads())
            .finish()
    }
}
