//! A fixed pool of worker threads for store calls.
//!
//! Work submitted here runs on the pool's own multi-threaded runtime, off the task that owns
//! the operation callbacks. Its outcome comes back as a `PendingResult`, so it is wrapped in an
//! `AsyncOperation` like any other result.

use std::future::Future;
use tokio::runtime::{Builder, Runtime};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::log::{debug, trace};
use crate::operation::PendingResult;

pub struct WorkerPool {
    runtime: Option<Runtime>,
    workers: usize,
}

impl WorkerPool {
    /// # Errors
    /// `StoreError` if `workers` is zero or the threads cannot be started.
    pub fn new(workers: usize) -> Result<Self, StoreError> {
        if workers == 0 {
            return Err("a worker pool needs at least one worker".into());
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("fieldstore-worker")
            .enable_all()
            .build()?;
        debug!("started worker pool with {} workers", workers);
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    /// # Errors
    /// See `new`.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(config.workers)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work` on the pool.
    pub fn submit<T, F>(&self, work: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (resolver, pending) = PendingResult::channel();
        if let Some(runtime) = &self.runtime {
            runtime.spawn(async move {
                let result = work.await;
                if resolver.is_abandoned() {
                    trace!("worker result discarded, nobody is waiting");
                }
                resolver.settle(result);
            });
        }
        pending
    }

    /// Runs a blocking closure on the pool's blocking threads.
    pub fn submit_blocking<T, F>(&self, work: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let (resolver, pending) = PendingResult::channel();
        if let Some(runtime) = &self.runtime {
            runtime.spawn_blocking(move || resolver.settle(work()));
        }
        pending
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Shutting down without blocking lets a pool be dropped from inside another runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
