//! Drives a single job from `pending` to a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::queue::WorkItem;
use crate::cache::{CacheIndex, fingerprint};
use crate::fetch::SourceFetcher;
use crate::jobs::{EventLog, JobLogger, JobSource, JobStatus, JobStore};
use crate::separation::{ChainError, Device, ProcessorChain, SeparationInput, StrategyContext};
use crate::utils::fs::ensure_dir_all_with_op;
use crate::{Error, Result};

/// Progress milestones reported to clients.
pub mod progress {
    pub const DOWNLOADING: u8 = 10;
    pub const SEPARATING: u8 = 40;
    pub const DONE: u8 = 100;
}

/// Directory inside a job's working directory that strategies write into.
const SEPARATED_DIR: &str = "separated";

/// Orchestrates cache lookup, fetch, separation and cache write-through.
pub struct JobPipeline {
    store: Arc<JobStore>,
    log: Arc<EventLog>,
    cache: Arc<CacheIndex>,
    fetcher: Arc<dyn SourceFetcher>,
    chain: ProcessorChain,
    device: Device,
    work_dir: PathBuf,
}

impl JobPipeline {
    pub fn new(
        store: Arc<JobStore>,
        log: Arc<EventLog>,
        cache: Arc<CacheIndex>,
        fetcher: Arc<dyn SourceFetcher>,
        chain: ProcessorChain,
        device: Device,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            log,
            cache,
            fetcher,
            chain,
            device,
            work_dir,
        }
    }

    pub fn chain(&self) -> &ProcessorChain {
        &self.chain
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Run a job to completion. Failures land in the record and the log;
    /// the sentinel is appended once the record is terminal.
    pub async fn run(&self, item: &WorkItem) {
        let logger = JobLogger::new(item.job_id.clone(), self.log.clone());
        debug!(
            job_id = %item.job_id,
            waited_ms = item.enqueued_at.elapsed().as_millis() as u64,
            "Worker picked up job"
        );

        if let Err(e) = self.drive(item, &logger).await {
            self.fail(&item.job_id, &logger, &e);
        }

        logger.finish();
    }

    async fn drive(&self, item: &WorkItem, logger: &JobLogger) -> Result<()> {
        let job_id = item.job_id.as_str();
        self.ensure_active(item)?;

        let job_dir = self.job_dir(job_id);
        let input = match &item.source {
            JobSource::Remote { url } => {
                let fp = fingerprint(url);
                logger.info("Checking cache...");
                if let Some(entry) = self.cache.lookup(&fp).await {
                    logger.info(format!("Cache hit ({fp}), reusing previous result"));
                    logger.info("Processing complete!");
                    self.store.transition_with(
                        job_id,
                        JobStatus::Completed,
                        progress::DONE,
                        "Processing complete! (from cache)",
                        |record| {
                            record.attach_artifacts(Some(entry.foreground), entry.background);
                            if entry.title.is_some() {
                                record.title = entry.title;
                            }
                            record.from_cache = true;
                        },
                    )?;
                    info!(job_id = %job_id, fingerprint = %fp, "Completed from cache");
                    return Ok(());
                }

                logger.info("Downloading audio...");
                self.store.transition(
                    job_id,
                    JobStatus::Downloading,
                    progress::DOWNLOADING,
                    "Downloading audio...",
                )?;
                ensure_dir_all_with_op("creating job directory", &job_dir).await?;

                let fetched = self.fetcher.fetch(url, &job_dir, &item.cancel).await?;
                if let Some(title) = &fetched.title {
                    logger.info(format!("Downloaded: {title}"));
                    let title = title.clone();
                    self.store.update(job_id, |record| record.title = Some(title))?;
                } else {
                    logger.info("Download finished");
                }
                fetched.path
            }
            JobSource::Upload { path, .. } => path.clone(),
        };

        self.ensure_active(item)?;
        logger.info("Separating vocals and instrumental...");
        self.store.transition(
            job_id,
            JobStatus::Separating,
            progress::SEPARATING,
            "Separating vocals and instrumental...",
        )?;

        let ctx = StrategyContext {
            device: self.device.clone(),
            cancel: item.cancel.clone(),
            logger: logger.clone(),
        };
        let separation = SeparationInput {
            input,
            output_dir: job_dir.join(SEPARATED_DIR),
        };
        let output = self.chain.separate(&separation, &ctx).await?;

        if item.source.is_cacheable() {
            let source = item.source.identifier();
            match &output.foreground {
                Some(foreground) => {
                    let title = self.store.get(job_id).and_then(|r| r.title);
                    match self
                        .cache
                        .store(
                            &fingerprint(source),
                            foreground,
                            &output.background,
                            title.as_deref(),
                            source,
                        )
                        .await
                    {
                        Ok(_) => logger.info("Result cached"),
                        Err(e) => logger.warn(format!("Failed to cache result: {e}")),
                    }
                }
                None => logger.info("Result has no vocals track and was not cached"),
            }
        }

        logger.info("Processing complete!");
        let strategy = output.strategy.clone();
        self.store.transition_with(
            job_id,
            JobStatus::Completed,
            progress::DONE,
            "Processing complete!",
            move |record| {
                record.attach_artifacts(output.foreground, output.background);
                record.strategy = Some(output.strategy);
            },
        )?;
        info!(job_id = %job_id, strategy = %strategy, "Job completed");
        Ok(())
    }

    /// Fail before doing more work if the job was stopped.
    fn ensure_active(&self, item: &WorkItem) -> Result<()> {
        let stopped = item.cancel.is_cancelled()
            || self
                .store
                .get(&item.job_id)
                .map(|r| r.status.is_terminal())
                .unwrap_or(true);
        if stopped {
            return Err(ChainError::Cancelled.into());
        }
        Ok(())
    }

    fn fail(&self, job_id: &str, logger: &JobLogger, err: &Error) {
        let Some(record) = self.store.get(job_id) else {
            warn!(job_id = %job_id, "Job record vanished while running");
            return;
        };

        if record.status.is_terminal() {
            // The stop action already moved the record to `error`.
            logger.info("Job stopped");
            return;
        }

        let message = if err.is_cancelled() {
            "Cancelled".to_string()
        } else {
            format!("Processing failed: {err}")
        };
        logger.error(message.clone());
        if let Err(e) = self
            .store
            .transition(job_id, JobStatus::Error, record.progress, message)
        {
            warn!(job_id = %job_id, error = %e, "Failed to mark job as failed");
        }
    }
}
