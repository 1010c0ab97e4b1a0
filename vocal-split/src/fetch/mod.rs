//! Fetching remote media into a job's working directory.

mod source;
mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::utils::process::ToolError;

pub use source::{
    ALLOWED_EXTENSIONS, SUPPORTED_HOSTS, SourceError, sanitize_filename, validate_remote_url,
    validate_upload,
};
pub use ytdlp::YtDlpFetcher;

/// Failure while fetching a remote source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Tool(String),

    #[error("download timed out after {0}s")]
    Timeout(u64),

    #[error("download produced no audio file in {}", .0.display())]
    NoOutput(PathBuf),

    #[error("download cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for FetchError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Timeout { timeout, .. } => Self::Timeout(timeout.as_secs()),
            ToolError::Cancelled { .. } => Self::Cancelled,
            other => Self::Tool(other.to_string()),
        }
    }
}

/// Audio fetched for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// Downloads a remote source as an audio file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Name of the fetcher, reported by the health endpoint.
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Fetch `url` into `dest_dir`. Must honor `cancel` promptly.
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, FetchError>;
}
