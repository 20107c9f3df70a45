use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

mod handlers;
mod routes;
mod state;

use common::config::Settings;
use common::dispatch::apply_schedule;
use common::store::{ConfigStore, JsonFileConfigStore};
use common::telemetry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        config_path = %settings.storage.config_path.display(),
        "Starting dispatcher API server"
    );

    let metrics_handle = telemetry::init_metrics()?;

    let store: Arc<dyn ConfigStore> =
        Arc::new(JsonFileConfigStore::new(settings.storage.config_path.clone()));
    let state = AppState::new(settings.clone(), store, Some(metrics_handle));

    let config = state
        .store
        .load()
        .await
        .context("Failed to load dispatch configuration")?;
    if let Err(e) = apply_schedule(
        &state.scheduler,
        &config.schedule,
        Arc::clone(&state.dispatcher),
    )
    .await
    {
        // Keep serving so the schedule can be fixed through the API
        tracing::error!(error = %e, "Stored schedule could not be applied");
    }

    let scheduler = Arc::clone(&state.scheduler);
    let app = routes::create_router(state);

    let addr = SocketAddr::from((
        settings
            .server
            .host
            .parse::<std::net::IpAddr>()
            .context("Invalid server host")?,
        settings.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
