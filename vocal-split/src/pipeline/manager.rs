//! Job manager: the façade the HTTP layer talks to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::queue::{JobQueue, QueueDepthStatus, WorkItem};
use super::runner::JobPipeline;
use super::worker_pool::{WorkerPool, WorkerPoolConfig};
use crate::cache::{CacheIndex, CacheStats};
use crate::config::AppConfig;
use crate::fetch::{
    SourceFetcher, YtDlpFetcher, sanitize_filename, validate_remote_url, validate_upload,
};
use crate::jobs::{EventLog, JobRecord, JobSource, JobStatus, JobStore, LogLine, Track};
use crate::separation::{Device, ProcessorChain, StrategyInfo, default_chain};
use crate::utils::fs::{ensure_dir_all_with_op, io_error, is_file, remove_dir_if_exists};
use crate::{Error, Result};

/// Message set on a record by the stop action.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Availability of each external tool, by name.
    pub tools: BTreeMap<String, bool>,
    pub device: Device,
    pub strategies: Vec<StrategyInfo>,
    pub workers: usize,
    pub active_workers: usize,
    pub queue_depth: usize,
    pub queue_status: QueueDepthStatus,
    pub jobs: usize,
}

/// Owns the job store, event log, cache, queue and worker pool.
pub struct JobManager {
    config: AppConfig,
    store: Arc<JobStore>,
    log: Arc<EventLog>,
    cache: Arc<CacheIndex>,
    queue: Arc<JobQueue>,
    pool: WorkerPool,
    pipeline: Arc<JobPipeline>,
    fetcher: Arc<dyn SourceFetcher>,
    /// Cancellation token of every non-deleted job.
    tokens: DashMap<String, CancellationToken>,
}

impl JobManager {
    /// Manager with the `yt-dlp` fetcher and the default strategy chain.
    pub fn new(config: AppConfig) -> Self {
        let fetcher = Arc::new(
            YtDlpFetcher::new(config.ytdlp_path.clone(), config.fetch_timeout)
                .with_ffmpeg_path(config.ffmpeg_path.clone()),
        );
        let chain = default_chain(&config);
        Self::with_parts(config, fetcher, chain)
    }

    /// Manager with a custom fetcher and chain.
    pub fn with_parts(
        config: AppConfig,
        fetcher: Arc<dyn SourceFetcher>,
        chain: ProcessorChain,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let log = Arc::new(EventLog::new());
        let cache = Arc::new(CacheIndex::new(config.cache_dir.clone()));
        let pipeline = Arc::new(JobPipeline::new(
            store.clone(),
            log.clone(),
            cache.clone(),
            fetcher.clone(),
            chain,
            config.device(),
            config.work_dir.clone(),
        ));
        let pool = WorkerPool::new(WorkerPoolConfig {
            max_workers: config.max_workers,
            ..WorkerPoolConfig::default()
        });

        Self {
            config,
            store,
            log,
            cache,
            queue: Arc::new(JobQueue::new()),
            pool,
            pipeline,
            fetcher,
            tokens: DashMap::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Create the working and cache roots and start the workers.
    pub async fn start(&self) -> Result<()> {
        ensure_dir_all_with_op("creating work directory", &self.config.work_dir).await?;
        ensure_dir_all_with_op("creating cache directory", &self.config.cache_dir).await?;
        self.pool.start(self.queue.clone(), self.pipeline.clone());
        Ok(())
    }

    /// Stop the workers, cancelling jobs in flight.
    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }

    fn admit(&self, record: JobRecord) -> Result<JobRecord> {
        let id = record.id.clone();
        let source = record.source.clone();
        self.store.create(record.clone())?;
        self.log.open(&id);
        self.log.append(&id, format!("Job created: {}", source.identifier()));

        let token = CancellationToken::new();
        self.tokens.insert(id.clone(), token.clone());
        let depth = self.queue.enqueue(WorkItem::new(id.clone(), source, token));
        info!(job_id = %id, queue_depth = depth, "Job submitted");
        Ok(record)
    }

    /// Submit a remote URL.
    ///
    /// The URL is kept as submitted (trimmed) so that it fingerprints
    /// exactly as the caller spelled it.
    pub fn submit_remote(&self, url: &str) -> Result<JobRecord> {
        validate_remote_url(url)?;
        let id = Uuid::new_v4().to_string();
        self.admit(JobRecord::new(
            id,
            JobSource::Remote {
                url: url.trim().to_string(),
            },
        ))
    }

    /// Submit an uploaded file. The bytes are stored in the job's working
    /// directory before the job is queued.
    pub async fn submit_upload(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<JobRecord> {
        let filename = sanitize_filename(filename);
        let extension = validate_upload(&filename, content_type)?;
        if data.is_empty() {
            return Err(Error::invalid_source("uploaded file is empty"));
        }

        let id = Uuid::new_v4().to_string();
        let job_dir = self.pipeline.job_dir(&id);
        ensure_dir_all_with_op("creating job directory", &job_dir).await?;
        let path = job_dir.join(format!("original.{extension}"));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_error("writing upload", &path, e))?;

        self.admit(JobRecord::new(id, JobSource::Upload { filename, path }))
    }

    pub fn status(&self, id: &str) -> Result<JobRecord> {
        self.store.get(id).ok_or_else(|| Error::not_found("Job", id))
    }

    /// Log lines from `from` onwards plus the next cursor.
    pub fn tail_logs(&self, id: &str, from: usize) -> Result<(Vec<LogLine>, usize)> {
        self.log
            .tail(id, from)
            .ok_or_else(|| Error::not_found("Job", id))
    }

    /// Stop a job: flip it to `error` and kill whatever it is running.
    ///
    /// Returns the record and whether anything changed; stopping a terminal
    /// job is a no-op.
    pub fn stop(&self, id: &str) -> Result<(JobRecord, bool)> {
        let (record, changed) = self.store.cancel(id, CANCELLED_MESSAGE)?;
        if !changed {
            return Ok((record, false));
        }

        self.log.append(id, "Stop requested by user");
        if let Some(token) = self.tokens.get(id) {
            token.cancel();
        }
        // Never picked up by a worker: nothing else will finish the log.
        if self.queue.remove(id).is_some() {
            self.log.append(id, "Job stopped");
            self.log.finish(id);
        }
        info!(job_id = %id, "Job stopped");
        Ok((record, true))
    }

    /// Completed jobs, newest first.
    pub fn history(&self) -> Vec<JobRecord> {
        self.store.list_by_status(JobStatus::Completed)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        self.store.list()
    }

    /// Delete a terminal job with its log and working directory.
    pub async fn delete_history(&self, id: &str) -> Result<()> {
        let record = self.status(id)?;
        if !record.status.is_terminal() {
            return Err(Error::JobActive(id.to_string()));
        }

        self.store.remove(id);
        self.log.remove(id);
        self.tokens.remove(id);

        let job_dir = self.pipeline.job_dir(id);
        if let Err(e) = remove_dir_if_exists(&job_dir).await {
            warn!(job_id = %id, error = %e, "Failed to remove job directory");
        }
        info!(job_id = %id, "Deleted job");
        Ok(())
    }

    /// Path of a completed job's track.
    pub async fn artifact(&self, id: &str, track: Track) -> Result<PathBuf> {
        let record = self.status(id)?;
        if record.status != JobStatus::Completed {
            return Err(Error::NotCompleted(id.to_string()));
        }

        let path = record
            .artifact(track)
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::ArtifactMissing(format!("job {id} has no {track} track")))?;
        if !is_file(&path).await {
            return Err(Error::ArtifactMissing(format!(
                "{track} file for job {id} is missing"
            )));
        }
        Ok(path)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    pub async fn cache_delete(&self, fingerprint: &str) -> Result<()> {
        if self.cache.delete(fingerprint).await? {
            Ok(())
        } else {
            Err(Error::not_found("Cache entry", fingerprint))
        }
    }

    pub async fn cache_clear(&self) -> Result<usize> {
        self.cache.clear().await
    }

    pub fn health(&self) -> HealthReport {
        let mut tools = BTreeMap::new();
        tools.insert(
            "demucs".to_string(),
            process_utils::is_available(&self.config.demucs_path),
        );
        tools.insert(
            "spleeter".to_string(),
            process_utils::is_available(&self.config.spleeter_path),
        );
        tools.insert(
            "ffmpeg".to_string(),
            process_utils::is_available(&self.config.ffmpeg_path),
        );
        tools.insert(self.fetcher.name().to_string(), self.fetcher.is_available());

        HealthReport {
            status: "ok",
            tools,
            device: self.config.device(),
            strategies: self.pipeline.chain().strategies(),
            workers: self.pool.max_workers(),
            active_workers: self.pool.active_count(),
            queue_depth: self.queue.depth(),
            queue_status: self.queue.depth_status(),
            jobs: self.store.len(),
        }
    }
}
