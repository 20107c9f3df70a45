use axum::{extract::State, Json};
use common::dispatch::apply_schedule;
use common::models::DispatchConfig;
use common::schedule::parse_time_of_day;
use tracing::{error, info};

use super::{ErrorResponse, OkResponse};
use crate::state::AppState;

/// Current configuration record
#[tracing::instrument(skip(state))]
pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<DispatchConfig>, ErrorResponse> {
    let config = state.store.load().await.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        ErrorResponse::new("storage_error", format!("Failed to load configuration: {}", e))
    })?;
    Ok(Json(config))
}

/// Replace the configuration record and re-apply its schedule
#[tracing::instrument(skip(state, config))]
pub async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<DispatchConfig>,
) -> Result<OkResponse, ErrorResponse> {
    if config.schedule.enabled {
        parse_time_of_day(&config.schedule.time)
            .map_err(|e| ErrorResponse::new("validation_error", e.to_string()))?;
    }

    state.store.save(&config).await.map_err(|e| {
        ErrorResponse::new("storage_error", format!("Failed to save configuration: {}", e))
    })?;

    apply_schedule(
        &state.scheduler,
        &config.schedule,
        state.dispatcher.clone(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to apply schedule");
        ErrorResponse::new("schedule_error", format!("Failed to apply schedule: {}", e))
    })?;

    info!(
        monitor_folder = %config.monitor_folder,
        schedule_enabled = config.schedule.enabled,
        "Configuration updated"
    );

    Ok(OkResponse::new("Configuration saved"))
}
