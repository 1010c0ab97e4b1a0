//! Job pipeline: admission queue, worker pool and orchestration.

mod manager;
mod queue;
mod runner;
mod worker_pool;

pub use manager::{CANCELLED_MESSAGE, HealthReport, JobManager};
pub use queue::{JobQueue, QueueDepthStatus, WorkItem};
pub use runner::{JobPipeline, progress};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
