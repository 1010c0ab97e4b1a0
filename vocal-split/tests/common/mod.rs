//! Fakes and helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vocal_split::config::AppConfig;
use vocal_split::fetch::{FetchError, FetchedMedia, SourceFetcher};
use vocal_split::jobs::{JobRecord, LogLine};
use vocal_split::pipeline::JobManager;
use vocal_split::separation::{
    ProcessorChain, SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext,
    StrategyFailure,
};

pub const URL: &str = "https://www.youtube.com/watch?v=jNQXAC9IVRw";

/// Fetcher that writes a small file instead of downloading.
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeFetcher {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    fn name(&self) -> &str {
        "fake-fetcher"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if self.fail {
            return Err(FetchError::Tool("`yt-dlp` exited with code 1: video unavailable".into()));
        }
        let path = dest_dir.join("original.mp3");
        tokio::fs::write(&path, format!("audio of {url}")).await?;
        Ok(FetchedMedia {
            path,
            title: Some("Me at the zoo".to_string()),
        })
    }
}

#[derive(Clone, Copy)]
pub enum Behaviour {
    Succeed,
    BackgroundOnly,
    Fail,
    /// Blocks until cancelled.
    Hang,
}

/// Strategy that writes marker files instead of running a tool.
pub struct FakeStrategy {
    pub name: &'static str,
    pub behaviour: Behaviour,
    pub calls: AtomicUsize,
}

impl FakeStrategy {
    pub fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SeparationStrategy for FakeStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tool(&self) -> &str {
        "fake-tool"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn produces_foreground(&self) -> bool {
        !matches!(self.behaviour, Behaviour::BackgroundOnly)
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn separate(
        &self,
        input: &SeparationInput,
        ctx: &StrategyContext,
    ) -> Result<SeparationOutput, StrategyFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = input.strategy_dir(self.name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StrategyFailure::Other(e.to_string()))?;

        let write = |file: &str, body: String| {
            let path = dir.join(file);
            async move {
                tokio::fs::write(&path, body)
                    .await
                    .map_err(|e| StrategyFailure::Other(e.to_string()))?;
                Ok::<_, StrategyFailure>(path)
            }
        };

        match self.behaviour {
            Behaviour::Succeed => Ok(SeparationOutput {
                foreground: Some(write("vocals.mp3", format!("{} vocals", self.name)).await?),
                background: write("no_vocals.mp3", format!("{} instrumental", self.name)).await?,
            }),
            Behaviour::BackgroundOnly => Ok(SeparationOutput {
                foreground: None,
                background: write("instrumental.mp3", format!("{} instrumental", self.name))
                    .await?,
            }),
            Behaviour::Fail => Err(StrategyFailure::ExitStatus {
                code: Some(1),
                stderr: format!("{} could not load model", self.name),
            }),
            Behaviour::Hang => {
                ctx.cancel.cancelled().await;
                Err(StrategyFailure::Cancelled)
            }
        }
    }
}

/// A started manager over temporary directories.
pub struct Harness {
    pub manager: Arc<JobManager>,
    pub fetcher: Arc<FakeFetcher>,
    pub dir: TempDir,
}

pub fn test_config(dir: &Path, max_workers: usize) -> AppConfig {
    AppConfig {
        work_dir: dir.join("work"),
        cache_dir: dir.join("cache"),
        log_dir: dir.join("logs"),
        max_workers,
        log_poll_interval: Duration::from_millis(10),
        ..AppConfig::default()
    }
}

pub async fn harness(strategies: Vec<Arc<dyn SeparationStrategy>>) -> Harness {
    harness_with(strategies, FakeFetcher::default(), 2).await
}

pub async fn harness_with(
    strategies: Vec<Arc<dyn SeparationStrategy>>,
    fetcher: FakeFetcher,
    max_workers: usize,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(fetcher);
    let manager = Arc::new(JobManager::with_parts(
        test_config(dir.path(), max_workers),
        fetcher.clone(),
        ProcessorChain::new(strategies),
    ));
    manager.start().await.unwrap();
    Harness {
        manager,
        fetcher,
        dir,
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_terminal(manager: &JobManager, id: &str) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let record = manager.status(id).unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

/// Poll until the job's log carries the end-of-run sentinel.
pub async fn wait_log_finished(manager: &JobManager, id: &str) -> Vec<LogLine> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (lines, _) = manager.tail_logs(id, 0).unwrap();
            if lines.last().is_some_and(|l| l.is_sentinel()) {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("log was not finished in time")
}

/// Poll until `predicate` holds for the job record.
pub async fn wait_until<F>(manager: &JobManager, id: &str, predicate: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let record = manager.status(id).unwrap();
            if predicate(&record) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

pub fn messages(lines: &[LogLine]) -> Vec<String> {
    lines.iter().map(|l| l.message.clone()).collect()
}
