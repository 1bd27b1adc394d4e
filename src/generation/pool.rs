//! Bounded worker pool for generation jobs

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default number of generation jobs allowed to run at once
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Runs jobs as tokio tasks, at most `size` at a time. Excess jobs wait for
/// a permit instead of piling onto the providers.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
    completed: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn spawn<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let completed = Arc::clone(&self.completed);
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                debug!("Worker pool closed, dropping job");
                return;
            };
            job.await;
            completed.fetch_add(1, Ordering::Relaxed);
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running job
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
