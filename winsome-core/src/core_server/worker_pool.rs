//! Bounded worker pool for domain execution
//!
//! Every unit of work is spawned immediately but only runs once it holds one
//! of `size` permits, so at most `size` requests execute at a time. Work that
//! is waiting for a permit keeps its connection parked; the event loop never
//! waits on the pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,

    #[error("connection {0} already has a request in flight")]
    ConnectionBusy(u64),
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        WorkerPool { permits: Arc::new(Semaphore::new(size)), tracker: TaskTracker::new(), size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue one unit of work
    pub fn submit<F>(&self, work: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(PoolError::ShutDown);
        }
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            // closed only during shutdown
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            work.await;
        });
        Ok(())
    }

    /// Units currently executing
    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Units executing or waiting for a permit
    pub fn queued(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait up to `grace` for queued work to finish.
    /// Returns whether everything drained in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            debug!("Worker pool drained");
        } else {
            warn!(remaining = self.tracker.len(), "Worker pool did not drain before the grace period");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(1);
        assert!(pool.shutdown(Duration::from_millis(10)).await);
        assert_eq!(pool.submit(async {}), Err(PoolError::ShutDown));
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_work() {
        let pool = WorkerPool::new(1);
        let (_tx, rx) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = rx.await;
        })
        .unwrap();

        assert!(!pool.shutdown(Duration::from_millis(20)).await);
    }
}
