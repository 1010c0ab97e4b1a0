//! In-memory FIFO admission queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::jobs::JobSource;

/// Queue depth at which the health report starts warning.
const WARNING_THRESHOLD: usize = 16;
/// Queue depth considered critical.
const CRITICAL_THRESHOLD: usize = 64;

/// Queue depth status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDepthStatus {
    /// Queue depth is normal.
    Normal,
    /// Queue depth is at warning level.
    Warning,
    /// Queue depth is at critical level.
    Critical,
}

/// A job waiting for a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: String,
    pub source: JobSource,
    /// Cancelled by the stop action or on shutdown.
    pub cancel: CancellationToken,
    pub enqueued_at: Instant,
}

impl WorkItem {
    pub fn new(job_id: impl Into<String>, source: JobSource, cancel: CancellationToken) -> Self {
        Self {
            job_id: job_id.into(),
            source,
            cancel,
            enqueued_at: Instant::now(),
        }
    }
}

/// FIFO queue feeding the worker pool. Enqueueing never blocks.
#[derive(Default)]
pub struct JobQueue {
    items: parking_lot::Mutex<VecDeque<WorkItem>>,
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an item and wake one worker. Returns the queue depth.
    pub fn enqueue(&self, item: WorkItem) -> usize {
        let depth = {
            let mut items = self.items.lock();
            items.push_back(item);
            items.len()
        };
        debug!(depth, "Enqueued job");
        self.notify.notify_one();
        depth
    }

    /// Pop the oldest item.
    pub fn dequeue(&self) -> Option<WorkItem> {
        self.items.lock().pop_front()
    }

    /// Remove a still-queued job. Returns `None` if a worker already took it.
    pub fn remove(&self, job_id: &str) -> Option<WorkItem> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|i| i.job_id == job_id)?;
        items.remove(pos)
    }

    pub fn depth(&self) -> usize {
        self.items.lock().len()
    }

    pub fn depth_status(&self) -> QueueDepthStatus {
        let depth = self.depth();
        if depth >= CRITICAL_THRESHOLD {
            QueueDepthStatus::Critical
        } else if depth >= WARNING_THRESHOLD {
            QueueDepthStatus::Warning
        } else {
            QueueDepthStatus::Normal
        }
    }

    /// Get a notifier for new jobs.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
