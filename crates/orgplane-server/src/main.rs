//! orgplane server: application entry point.

use anyhow::{Context, Result};
use orgplane_engine::spawn_janitor;
use orgplane_server::{AppState, ServerConfig, build_router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("orgplane=info".parse()?),
        )
        .json()
        .init();

    info!("Starting orgplane server...");

    let config = ServerConfig::from_env().context("load configuration")?;
    let (state, worker) = AppState::initialize(&config).await?;

    let janitor = spawn_janitor(
        state.ledger.clone(),
        config.engine.janitor_interval,
        config.engine.ledger_retention,
        config.engine.ledger_stale_after,
    );

    let app = build_router(state, config.request_timeout);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve HTTP")?;

    janitor.abort();
    // Queued provisioning jobs run to completion once the senders are gone.
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Provisioning worker ended abnormally");
    }

    info!("orgplane server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
    }
}
