//! Spleeter 2-stem separation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext, StrategyFailure,
    require_output,
};
use crate::utils::fs::ensure_dir_all;
use crate::utils::process::{run_tool, tool_name};

pub struct SpleeterStrategy {
    program: String,
    timeout: Duration,
}

impl SpleeterStrategy {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn build_args(&self, input: &Path, out_dir: &Path) -> Vec<String> {
        vec![
            "separate".to_string(),
            "-p".to_string(),
            "spleeter:2stems".to_string(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl SeparationStrategy for SpleeterStrategy {
    fn name(&self) -> &'static str {
        "spleeter"
    }

    fn tool(&self) -> &str {
        &self.program
    }

    fn timeout(&self) -> Duration {
        self.timeout
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

        ctx.logger.info("Running spleeter (2stems)");

        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.args(self.build_args(&input.input, &out_dir));
        run_tool(cmd, &tool_name(&self.program), self.timeout, &ctx.cancel).await?;

        // Spleeter writes `<out>/<input stem>/{vocals,accompaniment}.wav`.
        let stems = out_dir.join(input.stem());
        let vocals = require_output(&stems.join("vocals.wav")).await?;
        let accompaniment = require_output(&stems.join("accompaniment.wav")).await?;

        Ok(SeparationOutput {
            foreground: Some(vocals),
            background: accompaniment,
        })
    }
}
