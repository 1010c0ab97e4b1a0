//! Per-job append-only progress log.
//!
//! The pipeline appends lines while any number of readers tail the log with
//! their own cursor. A sentinel line marks the end of the pipeline run, so a
//! reader can stop without relying on the record status alone.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Line appended once the pipeline has finished with a job.
pub const LOG_SENTINEL: &str = "[DONE]";

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogLine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.message == LOG_SENTINEL
    }

    /// `[HH:MM:SS] message` in server local time; the sentinel renders bare.
    pub fn render(&self) -> String {
        if self.is_sentinel() {
            return LOG_SENTINEL.to_string();
        }
        format!(
            "[{}] {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            self.message
        )
    }
}

#[derive(Default)]
struct JobLines {
    lines: Vec<LogLine>,
    finished: bool,
}

/// Append-only log channel for every job.
#[derive(Default)]
pub struct EventLog {
    logs: DashMap<String, Arc<RwLock<JobLines>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, job_id: &str) -> Option<Arc<RwLock<JobLines>>> {
        self.logs.get(job_id).map(|c| c.clone())
    }

    /// Create an empty log for a job. Existing logs are kept.
    pub fn open(&self, job_id: &str) {
        self.logs.entry(job_id.to_string()).or_default();
    }

    /// Append a line. Returns `false` if the log is unknown or already finished.
    pub fn append(&self, job_id: &str, message: impl Into<String>) -> bool {
        let Some(channel) = self.channel(job_id) else {
            return false;
        };
        let mut guard = channel.write();
        if guard.finished {
            debug!(job_id = %job_id, "Dropping log line appended after completion");
            return false;
        }
        guard.lines.push(LogLine::new(message));
        true
    }

    /// Append the sentinel line. Idempotent.
    pub fn finish(&self, job_id: &str) -> bool {
        let Some(channel) = self.channel(job_id) else {
            return false;
        };
        let mut guard = channel.write();
        if guard.finished {
            return false;
        }
        guard.lines.push(LogLine::new(LOG_SENTINEL));
        guard.finished = true;
        true
    }

    /// Lines from index `from` onwards plus the cursor for the next call.
    pub fn tail(&self, job_id: &str, from: usize) -> Option<(Vec<LogLine>, usize)> {
        let channel = self.channel(job_id)?;
        let guard = channel.read();
        let start = from.min(guard.lines.len());
        Some((guard.lines[start..].to_vec(), guard.lines.len()))
    }

    pub fn is_finished(&self, job_id: &str) -> bool {
        self.channel(job_id)
            .map(|c| c.read().finished)
            .unwrap_or(false)
    }

    pub fn len(&self, job_id: &str) -> usize {
        self.channel(job_id).map(|c| c.read().lines.len()).unwrap_or(0)
    }

    pub fn remove(&self, job_id: &str) -> bool {
        self.logs.remove(job_id).is_some()
    }
}

/// Convenience handle writing one job's log and mirroring it to `tracing`.
#[derive(Clone)]
pub struct JobLogger {
    job_id: String,
    log: Arc<EventLog>,
}

impl JobLogger {
    pub fn new(job_id: impl Into<String>, log: Arc<EventLog>) -> Self {
        Self {
            job_id: job_id.into(),
            log,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(job_id = %self.job_id, "{}", message);
        self.log.append(&self.job_id, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(job_id = %self.job_id, "{}", message);
        self.log.append(&self.job_id, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(job_id = %self.job_id, "{}", message);
        self.log.append(&self.job_id, message);
    }

    pub fn finish(&self) {
        self.log.finish(&self.job_id);
    }
}
