use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use msg_dispatch::{Bootstrap, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::load(&path).map_err(|e| {
            error!(path = %path, error = %e, "failed to load config");
            e
        })?,
        None => ServiceConfig::from_env()?,
    };

    info!(
        topics = ?config.broker.topics,
        start_policy = ?config.start_policy,
        "starting msg-dispatchd"
    );

    let (bootstrap, _broker) = Bootstrap::in_memory(&config)?;

    #[cfg(feature = "http")]
    bootstrap.service().register_message_source(
        "rest",
        std::sync::Arc::new(msg_dispatch::RestMessageSource::new(config.rest.clone())),
    )?;

    bootstrap.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    bootstrap.stop().await?;
    info!(stats = ?bootstrap.service().stats(), "msg-dispatchd stopped");
    Ok(())
}
