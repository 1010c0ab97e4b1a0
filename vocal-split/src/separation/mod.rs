//! Audio separation strategies and the fallback chain that runs them.

mod chain;
mod demucs;
mod phase_cancel;
mod spleeter;
mod traits;

use std::sync::Arc;

pub use chain::{ChainError, ChainOutput, ProcessorChain, StrategyInfo};
pub use demucs::DemucsStrategy;
pub use phase_cancel::PhaseCancelStrategy;
pub use spleeter::SpleeterStrategy;
pub use traits::{
    Device, SeparationInput, SeparationOutput, SeparationStrategy, StrategyContext,
    StrategyFailure, require_output,
};

use crate::config::AppConfig;

/// The default chain: demucs, then spleeter, then phase cancellation.
pub fn default_chain(config: &AppConfig) -> ProcessorChain {
    let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![
        Arc::new(DemucsStrategy::new(
            config.demucs_path.clone(),
            config.demucs_timeout,
        )),
        Arc::new(SpleeterStrategy::new(
            config.spleeter_path.clone(),
            config.spleeter_timeout,
        )),
        Arc::new(PhaseCancelStrategy::new(
            config.ffmpeg_path.clone(),
            config.phase_cancel_timeout,
        )),
    ];
    ProcessorChain::new(strategies)
}
