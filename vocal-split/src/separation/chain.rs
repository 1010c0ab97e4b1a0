//! Ordered fallback chain of separation strategies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::traits::{
    SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext, StrategyFailure,
};

/// Slack on top of a strategy's own timeout before the chain drops its future.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Result of a successful chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    pub foreground: Option<PathBuf>,
    pub background: PathBuf,
    /// Name of the strategy that produced the tracks.
    pub strategy: String,
}

/// What the chain reports about one of its strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyInfo {
    pub name: &'static str,
    /// `false` for strategies that only ever yield a background track.
    pub foreground: bool,
}

/// Failure of the chain as a whole.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("all {attempts} strategies failed; last ({strategy}): {reason}")]
    Exhausted {
        attempts: usize,
        strategy: String,
        reason: String,
    },

    #[error("no separation strategies configured")]
    Empty,

    #[error("separation cancelled")]
    Cancelled,
}

/// Strategies tried in priority order until one succeeds.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    strategies: Vec<Arc<dyn SeparationStrategy>>,
}

impl ProcessorChain {
    pub fn new(strategies: Vec<Arc<dyn SeparationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategies in priority order.
    pub fn strategies(&self) -> Vec<StrategyInfo> {
        self.strategies
            .iter()
            .map(|s| StrategyInfo {
                name: s.name(),
                foreground: s.produces_foreground(),
            })
            .collect()
    }

    /// Run strategies in order. The first success wins.
    pub async fn separate(
        &self,
        input: &SeparationInput,
        ctx: &StrategyContext,
    ) -> Result<ChainOutput, ChainError> {
        if self.strategies.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut last: Option<(&'static str, StrategyFailure)> = None;

        for strategy in &self.strategies {
            if ctx.cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }

            let name = strategy.name();
            ctx.logger.info(format!("Trying strategy {name}..."));
            let started = Instant::now();

            match self.run_one(strategy.as_ref(), input, ctx).await {
                Ok(output) => {
                    info!(
                        job_id = %ctx.logger.job_id(),
                        strategy = name,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Separation succeeded"
                    );
                    if output.foreground.is_none() {
                        ctx.logger.warn(format!(
                            "Strategy {name} produced only the instrumental track"
                        ));
                    } else {
                        ctx.logger.info(format!("Strategy {name} succeeded"));
                    }
                    return Ok(ChainOutput {
                        foreground: output.foreground,
                        background: output.background,
                        strategy: name.to_string(),
                    });
                }
                Err(StrategyFailure::Cancelled) => return Err(ChainError::Cancelled),
                Err(failure) => {
                    ctx.logger.warn(format!("Strategy {name} failed: {failure}"));
                    last = Some((name, failure));
                }
            }
        }

        let (strategy, failure) = match last {
            Some(last) => last,
            None => return Err(ChainError::Empty),
        };
        Err(ChainError::Exhausted {
            attempts: self.strategies.len(),
            strategy: strategy.to_string(),
            reason: failure.to_string(),
        })
    }

    async fn run_one(
        &self,
        strategy: &dyn SeparationStrategy,
        input: &SeparationInput,
        ctx: &StrategyContext,
    ) -> Result<SeparationOutput, StrategyFailure> {
        if !strategy.is_available() {
            return Err(StrategyFailure::ToolMissing {
                tool: strategy.tool().to_string(),
            });
        }

        let limit = strategy.timeout() + TIMEOUT_GRACE;
        debug!(strategy = strategy.name(), limit_secs = limit.as_secs(), "Running strategy");

        match tokio::time::timeout(limit, strategy.separate(input, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(strategy = strategy.name(), "Strategy exceeded its timeout guard");
                Err(StrategyFailure::Timeout {
                    timeout: strategy.timeout(),
                })
            }
        }
    }
}
