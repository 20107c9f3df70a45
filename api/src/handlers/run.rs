use axum::extract::State;
use common::models::DispatchOutcome;

use super::{ErrorResponse, OkResponse};
use crate::state::AppState;

/// Run one dispatch now and report its outcome
#[tracing::instrument(skip(state))]
pub async fn run_now(State(state): State<AppState>) -> Result<OkResponse, ErrorResponse> {
    let outcome = state
        .dispatcher
        .execute()
        .await
        .map_err(|e| ErrorResponse::new("dispatch_failed", e.to_string()))?;

    let message = match outcome {
        DispatchOutcome::NoFile => "No file found to send".to_string(),
        DispatchOutcome::Sent { file, .. } => format!(
            "Sent {}",
            file.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        ),
    };

    Ok(OkResponse::new(message))
}
