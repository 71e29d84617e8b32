mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use telassist_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use telassist_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so nothing may log before this point.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let routes = Router::new()
        .merge(health::router(app.db_pool.clone(), app.orchestrator.clone()))
        .merge(api::router(app.orchestrator.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "telassist-server listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, routes)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_sessions = app.orchestrator.active_sessions(),
        "telassist-server stopping"
    );
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "in-flight requests did not finish before the shutdown deadline"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
