//! Fixed-size worker pool consuming the admission queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::JobQueue;
use super::runner::JobPipeline;

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent workers.
    pub max_workers: usize,
    /// Fallback poll interval in case a wake-up is missed.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A pool of workers, each running one pipeline at a time.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// Number of workers currently running a job.
    active_workers: Arc<AtomicUsize>,
    /// Cancelled on shutdown.
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Start the worker pool.
    pub fn start(&self, queue: Arc<JobQueue>, pipeline: Arc<JobPipeline>) {
        info!(
            "Starting worker pool with {} max workers",
            self.config.max_workers
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Worker pool already stopped, not starting");
            return;
        };

        for i in 0..self.config.max_workers {
            let cancellation_token = self.cancellation_token.clone();
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            let active = self.active_workers.clone();
            let notifier = queue.notifier();
            let poll_interval = self.config.poll_interval;

            join_set.spawn(async move {
                debug!("Worker {} started", i);

                loop {
                    if cancellation_token.is_cancelled() {
                        break;
                    }

                    // Drain before sleeping; a notification may have been
                    // consumed by a worker that was already busy.
                    while let Some(item) = queue.dequeue() {
                        active.fetch_add(1, Ordering::SeqCst);
                        debug!("Worker {} processing job {}", i, item.job_id);

                        let run = pipeline.run(&item);
                        tokio::pin!(run);
                        let finished = tokio::select! {
                            _ = &mut run => true,
                            _ = cancellation_token.cancelled() => false,
                        };
                        if !finished {
                            // Kill the running tool, then let the pipeline
                            // record the outcome.
                            item.cancel.cancel();
                            run.await;
                        }

                        active.fetch_sub(1, Ordering::SeqCst);
                        if cancellation_token.is_cancelled() {
                            break;
                        }
                    }

                    tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        _ = notifier.notified() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }

                debug!("Worker {} shutting down", i);
            });
        }
    }

    /// Stop the worker pool, cancelling in-flight jobs.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        // Take the join set out of the mutex before awaiting
        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    /// Get the number of workers currently running a job.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_stop_marks_pool_stopped() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        assert!(!pool.cancellation_token.is_cancelled());
        pool.stop().await;
        assert!(pool.cancellation_token.is_cancelled());
        assert_eq!(pool.active_count(), 0);
    }
}
