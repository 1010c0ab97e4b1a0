//! Demucs two-stem separation.
//!
//! Runs `demucs --two-stems=vocals` and picks up the `vocals` / `no_vocals`
//! stems it writes under `<out>/<model>/<input stem>/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext, StrategyFailure,
    require_output,
};
use crate::utils::fs::ensure_dir_all;
use crate::utils::process::{run_tool, tool_name};

/// Default model name; also the name of the directory Demucs writes into.
pub const DEFAULT_MODEL: &str = "htdemucs";

pub struct DemucsStrategy {
    program: String,
    model: String,
    timeout: Duration,
}

impl DemucsStrategy {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn build_args(&self, input: &Path, out_dir: &Path, device: &str) -> Vec<String> {
        vec![
            "--two-stems=vocals".to_string(),
            "--mp3".to_string(),
            "-n".to_string(),
            self.model.clone(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
            "-d".to_string(),
            device.to_string(),
            input.to_string_lossy().to_string(),
        ]
    }

    /// Where Demucs places the stems for `stem`.
    pub fn stem_dir(&self, out_dir: &Path, stem: &str) -> PathBuf {
        out_dir.join(&self.model).join(stem)
    }
}

#[async_trait]
impl SeparationStrategy for DemucsStrategy {
    fn name(&self) -> &'static str {
        "demucs"
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

        let device = ctx.device.tool_label();
        ctx.logger
            .info(format!("Running demucs ({}, device {device})", self.model));

        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.args(self.build_args(&input.input, &out_dir, device));
        run_tool(cmd, &tool_name(&self.program), self.timeout, &ctx.cancel).await?;

        let stems = self.stem_dir(&out_dir, &input.stem());
        let vocals = require_output(&stems.join("vocals.mp3")).await?;
        let instrumental = require_output(&stems.join("no_vocals.mp3")).await?;

        Ok(SeparationOutput {
            foreground: Some(vocals),
            background: instrumental,
        })
    }
}
