//! `yt-dlp` backed fetcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{FetchError, FetchedMedia, SourceFetcher};
use crate::utils::fs::{extension_lower, is_file};
use crate::utils::process::{run_tool, tool_name};

/// File stem of the downloaded audio inside the job directory.
const OUTPUT_STEM: &str = "original";

/// Downloads the best audio stream and converts it to mp3.
pub struct YtDlpFetcher {
    program: String,
    ffmpeg_path: Option<String>,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            ffmpeg_path: None,
            timeout,
        }
    }

    /// Point yt-dlp at a specific ffmpeg binary for audio conversion.
    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn build_args(&self, url: &str, dest_dir: &Path) -> Vec<String> {
        let template = dest_dir.join(format!("{OUTPUT_STEM}.%(ext)s"));
        let mut args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "192K".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--print".to_string(),
            "after_move:title".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.clone());
        }
        args.push(url.to_string());
        args
    }
}

/// Locate the converted audio file; the expected name first, then any
/// `original.*` audio file left behind.
async fn find_output(dest_dir: &Path) -> Result<PathBuf, FetchError> {
    let expected = dest_dir.join(format!("{OUTPUT_STEM}.mp3"));
    if is_file(&expected).await {
        return Ok(expected);
    }

    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(OUTPUT_STEM);
        let is_audio = extension_lower(&path)
            .map(|ext| super::ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if stem_matches && is_audio && is_file(&path).await {
            return Ok(path);
        }
    }

    Err(FetchError::NoOutput(dest_dir.to_path_buf()))
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        process_utils::is_available(&self.program)
    }

    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, FetchError> {
        tokio::fs::create_dir_all(dest_dir).await?;

        info!(url = %url, "Fetching audio with yt-dlp");
        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.args(self.build_args(url, dest_dir));

        let output = run_tool(cmd, &tool_name(&self.program), self.timeout, cancel).await?;
        let title = output
            .stdout
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .map(str::to_string);

        let path = find_output(dest_dir).await?;
        debug!(path = %path.display(), title = ?title, "Fetched audio");
        Ok(FetchedMedia { path, title })
    }
}
