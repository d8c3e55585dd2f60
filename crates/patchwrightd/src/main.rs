use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use patchwrightd::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let config = Config::parse();

    let level = if config.verbose { Level::DEBUG } else { Level::INFO };
    patchwright_core::init_tracing(config.json, level);

    let state = AppState::from_config(&config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, version = patchwright_core::VERSION, "patchwrightd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("patchwrightd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
}
