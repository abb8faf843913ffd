use relwatch::config::AppConfig;
use relwatch::logging::init_logging;
use relwatch::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(config.log_dir.as_deref())?;

    let container = ServiceContainer::new(config).await?;
    container.start().await?;
    tracing::info!("relwatch started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    container.shutdown().await?;
    Ok(())
}
