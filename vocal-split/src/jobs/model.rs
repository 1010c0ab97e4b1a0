//! Job record model and status state machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status.
///
/// ```text
/// pending ─┬─> downloading ──> separating ──> completed
///          ├──────────────────> separating      (uploads)
///          └──────────────────────────────> completed (cache hit)
/// any non-terminal state ──> error
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending,
    /// Fetching the remote source.
    Downloading,
    /// Running the separation chain.
    Separating,
    /// Finished with artifacts attached.
    Completed,
    /// Failed or stopped.
    Error,
}

impl JobStatus {
    /// `completed` and `error` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Completed | Error, _) => false,
            (_, Error) => true,
            (Pending, Downloading | Separating | Completed) => true,
            (Downloading, Separating) => true,
            (Separating, Completed) => true,
            _ => false,
        }
    }
}

/// Where a job's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobSource {
    /// A remote URL handed to the fetcher.
    Remote { url: String },
    /// A file uploaded by the client and already stored in the job directory.
    Upload {
        filename: String,
        #[serde(skip)]
        path: PathBuf,
    },
}

impl JobSource {
    /// Raw identifier of the source (URL or uploaded file name).
    pub fn identifier(&self) -> &str {
        match self {
            Self::Remote { url } => url,
            Self::Upload { filename, .. } => filename,
        }
    }

    /// Only remote sources have a stable identity worth caching.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// One of the two derived tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Foreground track (isolated voice).
    Vocals,
    /// Background track (everything else).
    Instrumental,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Vocals, Track::Instrumental];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Instrumental => "instrumental",
        }
    }

    /// Download URL for this track of a job.
    pub fn download_url(self, job_id: &str) -> String {
        format!("/download/{}/{}", job_id, self.as_str())
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Track {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vocals" | "vocal" | "foreground" => Ok(Self::Vocals),
            "instrumental" | "accompaniment" | "background" => Ok(Self::Instrumental),
            other => Err(format!("unknown track '{}'", other)),
        }
    }
}

/// Mutable state of a submitted job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    /// 0–100.
    pub progress: u8,
    pub message: String,
    pub title: Option<String>,
    pub source: JobSource,
    #[serde(skip)]
    pub foreground_artifact: Option<PathBuf>,
    #[serde(skip)]
    pub background_artifact: Option<PathBuf>,
    pub vocal_url: Option<String>,
    pub instrumental_url: Option<String>,
    /// Strategy that produced the artifacts.
    pub strategy: Option<String>,
    pub from_cache: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new pending record.
    pub fn new(id: impl Into<String>, source: JobSource) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: "Job created, waiting to be processed...".to_string(),
            title: None,
            source,
            foreground_artifact: None,
            background_artifact: None,
            vocal_url: None,
            instrumental_url: None,
            strategy: None,
            from_cache: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Path of the artifact for `track`, if one was produced.
    pub fn artifact(&self, track: Track) -> Option<&Path> {
        match track {
            Track::Vocals => self.foreground_artifact.as_deref(),
            Track::Instrumental => self.background_artifact.as_deref(),
        }
    }

    /// Attach produced artifacts and derive their download URLs.
    pub fn attach_artifacts(&mut self, foreground: Option<PathBuf>, background: PathBuf) {
        self.vocal_url = foreground
            .as_ref()
            .map(|_| Track::Vocals.download_url(&self.id));
        self.instrumental_url = Some(Track::Instrumental.download_url(&self.id));
        self.foreground_artifact = foreground;
        self.background_artifact = Some(background);
    }
}
