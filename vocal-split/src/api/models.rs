//! API request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobRecord, JobSource, JobStatus};

/// Body of `POST /api/process`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub url: String,
}

/// Job snapshot returned by the job endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: String,
    /// Same as `id`, under the name older clients poll with.
    pub task_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// URL or uploaded file name.
    pub source: String,
    pub vocal_url: Option<String>,
    pub instrumental_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub from_cache: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        let source = match &record.source {
            JobSource::Remote { url } => url.clone(),
            JobSource::Upload { filename, .. } => filename.clone(),
        };
        Self {
            task_id: record.id.clone(),
            id: record.id,
            status: record.status,
            progress: record.progress,
            message: record.message,
            title: record.title,
            source,
            vocal_url: record.vocal_url,
            instrumental_url: record.instrumental_url,
            strategy: record.strategy,
            from_cache: record.from_cache,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

/// Result of `POST /api/stop/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub id: String,
    /// `false` when the job had already finished.
    pub stopped: bool,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: String,
}
