//! Last-resort center-channel cancellation with ffmpeg.
//!
//! Subtracting one stereo channel from the other removes content panned to
//! the center, which is usually the lead vocal. The result is a rough
//! instrumental only; no vocal track can be recovered this way.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext, StrategyFailure,
    require_output,
};
use crate::utils::fs::ensure_dir_all;
use crate::utils::process::{run_tool, tool_name};

const PAN_FILTER: &str = "pan=stereo|c0=c0-c1|c1=c1-c0";

pub struct PhaseCancelStrategy {
    ffmpeg_path: String,
    timeout: Duration,
}

impl PhaseCancelStrategy {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            PAN_FILTER.to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl SeparationStrategy for PhaseCancelStrategy {
    fn name(&self) -> &'static str {
        "phase-cancel"
    }

    fn tool(&self) -> &str {
        &self.ffmpeg_path
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn produces_foreground(&self) -> bool {
        false
    }

    async fn separate(
        &self,
        input: &SeparationInput,
        ctx: &StrategyContext,
    ) -> Result<SeparationOutput, StrategyFailure> {
        let out_dir = input.strategy_dir(self.name());
        ensure_dir_all(&out_dir)
            .await
            .map_err(|e| StrategyFailure::Other(e.to_string()))?;
        let output = out_dir.join("instrumental.mp3");

        ctx.logger
            .warn("Falling back to phase cancellation; only an instrumental track will be produced");

        let mut cmd = process_utils::tokio_command(&self.ffmpeg_path);
        cmd.args(self.build_args(&input.input, &output));
        run_tool(cmd, &tool_name(&self.ffmpeg_path), self.timeout, &ctx.cancel).await?;

        Ok(SeparationOutput {
            foreground: None,
            background: require_output(&output).await?,
        })
    }
}
