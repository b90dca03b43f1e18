use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use kitanime_edge::{AppConfig, EdgeApplicationServer, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards have to live for the whole process or buffered logs and sentry events get dropped
    let _guards = Logger::init(
        config.cargo_env,
        &config.log_dir,
        config.sentry_dsn.clone(),
    );

    info!(
        "logger and env prepped, starting edge relay (provider {})...",
        config.upstream_provider
    );

    EdgeApplicationServer::run(config)
        .await
        .context("edge relay failed to start")?;

    Ok(())
}
