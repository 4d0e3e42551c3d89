use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool for post-processing jobs, shared across all sessions.
///
/// `submit` never waits: the job task is spawned immediately and acquires a
/// pool permit inside itself. Callers fire-and-continue while execution
/// parallelism stays capped at the pool size; a slow job holds one slot
/// until it finishes.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn submit<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now. Diagnostic only; it can change immediately.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
