use axum::{extract::State, Json};
use chrono::Utc;
use common::models::SchedulerStatus;

use crate::state::AppState;

/// Whether the scheduler loop runs and when the dispatch job fires next
#[tracing::instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    let running = state.scheduler.is_running().await;
    let next_run = state
        .scheduler
        .next_run_time()
        .await
        .map(|next| next.with_timezone(&Utc));

    Json(SchedulerStatus { running, next_run })
}
