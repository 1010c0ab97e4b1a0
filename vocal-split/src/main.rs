use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vocal_split::api::{ApiServer, AppState};
use vocal_split::config::AppConfig;
use vocal_split::logging;
use vocal_split::pipeline::JobManager;

/// How long in-flight jobs get to wind down on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env_or_default();

    let (logging_config, _guard) = logging::init_logging(&config.log_dir)?;
    let background = CancellationToken::new();
    logging_config.start_retention_cleanup(background.clone());

    info!(
        work_dir = %config.work_dir.display(),
        cache_dir = %config.cache_dir.display(),
        max_workers = config.max_workers,
        device = %config.device().tool_label(),
        "Starting vocal-split"
    );

    let manager = Arc::new(JobManager::new(config));
    manager.start().await?;

    let health = manager.health();
    for (tool, available) in &health.tools {
        if !available {
            warn!(tool = %tool, "External tool not found");
        }
    }

    let server = ApiServer::new(AppState::new(manager.clone()));
    let server_token = server.cancel_token();
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    server_token.cancel();
    background.cancel();
    match server_task.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, manager.shutdown())
        .await
        .is_err()
    {
        warn!("Shutdown timeout reached, forcing shutdown");
    }

    info!("vocal-split stopped");
    Ok(())
}
