//! Separation strategy trait and related types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::jobs::JobLogger;
use crate::utils::fs::is_file;
use crate::utils::process::{ToolError, describe_exit};

/// Compute device handed to strategies that can use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Whether an accelerator is available.
    pub accelerated: bool,
    /// Device label passed to tools (e.g. `cuda`, `cpu`).
    pub label: String,
}

impl Device {
    pub fn cpu() -> Self {
        Self {
            accelerated: false,
            label: "cpu".to_string(),
        }
    }

    /// Label to hand to tools; falls back to `cpu` when not accelerated.
    pub fn tool_label(&self) -> &str {
        if self.accelerated { &self.label } else { "cpu" }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

/// Input for a strategy run.
#[derive(Debug, Clone)]
pub struct SeparationInput {
    /// Source audio file.
    pub input: PathBuf,
    /// Directory the strategy may write into. Each strategy uses its own
    /// subdirectory so a failed attempt never collides with the next one.
    pub output_dir: PathBuf,
}

impl SeparationInput {
    /// File stem of the input, as used by tools that name their output after it.
    pub fn stem(&self) -> String {
        self.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("input")
            .to_string()
    }

    pub fn strategy_dir(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

/// Runtime context shared by every strategy of a chain run.
#[derive(Clone)]
pub struct StrategyContext {
    pub device: Device,
    pub cancel: CancellationToken,
    pub logger: JobLogger,
}

/// Tracks produced by a successful strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationOutput {
    pub foreground: Option<PathBuf>,
    pub background: PathBuf,
}

/// Why a single strategy failed.
#[derive(Error, Debug)]
pub enum StrategyFailure {
    #[error("`{tool}` is not available")]
    ToolMissing { tool: String },

    #[error("timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("exited with {}: {stderr}", describe_exit(.code))]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("expected output {} was not produced", .path.display())]
    OutputMissing { path: PathBuf },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl From<ToolError> for StrategyFailure {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Missing { tool } => Self::ToolMissing { tool },
            ToolError::Spawn { tool, source } => {
                Self::Other(format!("failed to start `{tool}`: {source}"))
            }
            ToolError::Timeout { timeout, .. } => Self::Timeout { timeout },
            ToolError::ExitStatus { code, stderr, .. } => Self::ExitStatus { code, stderr },
            ToolError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

/// Fail with [`StrategyFailure::OutputMissing`] unless `path` is a file.
pub async fn require_output(path: &Path) -> Result<PathBuf, StrategyFailure> {
    if is_file(path).await {
        Ok(path.to_path_buf())
    } else {
        Err(StrategyFailure::OutputMissing {
            path: path.to_path_buf(),
        })
    }
}

/// A named way of splitting audio into foreground and background tracks.
#[async_trait]
pub trait SeparationStrategy: Send + Sync {
    /// Strategy name, used in logs and job records.
    fn name(&self) -> &'static str;

    /// External tool the strategy invokes.
    fn tool(&self) -> &str;

    /// Hard upper bound on a single run.
    fn timeout(&self) -> Duration;

    /// Whether the strategy can produce a foreground track at all.
    fn produces_foreground(&self) -> bool {
        true
    }

    /// Whether the tool can be located.
    fn is_available(&self) -> bool {
        process_utils::is_available(self.tool())
    }

    /// Run the strategy.
    ///
    /// # Cancel Safety
    ///
    /// The chain may drop this future on its outer timeout; tool processes are
    /// spawned with `kill_on_drop` so nothing is left running.
    async fn separate(
        &self,
        input: &SeparationInput,
        ctx: &StrategyContext,
    ) -> Result<SeparationOutput, StrategyFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_label_falls_back_to_cpu() {
        let gpu = Device {
            accelerated: true,
            label: "cuda".to_string(),
        };
        assert_eq!(gpu.tool_label(), "cuda");

        let not_accelerated = Device {
            accelerated: false,
            label: "cuda".to_string(),
        };
        assert_eq!(not_accelerated.tool_label(), "cpu");
    }

    #[test]
    fn test_timeout_and_exit_failures_are_distinct() {
        let timeout: StrategyFailure = ToolError::Timeout {
            tool: "demucs".into(),
            timeout: Duration::from_secs(600),
        }
        .into();
        assert!(matches!(timeout, StrategyFailure::Timeout { .. }));
        assert_eq!(timeout.to_string(), "timed out after 600s");

        let exit: StrategyFailure = ToolError::ExitStatus {
            tool: "demucs".into(),
            code: Some(1),
            stderr: "bad input".into(),
        }
        .into();
        assert!(matches!(exit, StrategyFailure::ExitStatus { .. }));
        assert_eq!(exit.to_string(), "exited with code 1: bad input");
    }

    #[test]
    fn test_input_stem() {
        let input = SeparationInput {
            input: PathBuf::from("/w/job/original.mp3"),
            output_dir: PathBuf::from("/w/job/separated"),
        };
        assert_eq!(input.stem(), "original");
        assert_eq!(
            input.strategy_dir("demucs"),
            PathBuf::from("/w/job/separated/demucs")
        );
    }

    #[tokio::test]
    async fn test_require_output() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("vocals.mp3");
        std::fs::write(&present, b"x").unwrap();

        assert_eq!(require_output(&present).await.unwrap(), present);
        assert!(matches!(
            require_output(&dir.path().join("missing.mp3")).await,
            Err(StrategyFailure::OutputMissing { .. })
        ));
    }
}
