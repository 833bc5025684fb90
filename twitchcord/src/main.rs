use tracing::{error, info};
use twitchcord::config::AppConfig;
use twitchcord::logging::init_logging;
use twitchcord::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let (logging, _guard) = init_logging(&config.log_dir)?;

    info!(
        "twitchcord v{} starting, data in {}, logs in {}",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display(),
        logging.log_dir().display()
    );

    let mut container = match ServiceContainer::new(config).await {
        Ok(container) => container.with_logging(logging.clone()),
        Err(e) => {
            error!(error = %e, "Failed to open persisted state");
            return Err(e.into());
        }
    };
    logging.start_retention_cleanup(container.cancellation_token());
    container.initialize().await?;

    container.run_until_shutdown().await?;
    info!("twitchcord stopped");
    Ok(())
}
