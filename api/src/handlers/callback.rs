use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::callback::verify_and_decrypt;
use common::models::{CallbackChallenge, CallbackSecrets};
use tracing::{info, warn};

use super::ErrorResponse;
use crate::state::AppState;

/// URL ownership check: answer the platform with the decrypted echo.
///
/// Missing or malformed callback secrets are a client-side configuration
/// problem (400); anything failing verification is reported as 500.
#[tracing::instrument(skip(state, challenge))]
pub async fn verify_callback(
    State(state): State<AppState>,
    Query(challenge): Query<CallbackChallenge>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let config = state.store.load().await.map_err(|e| {
        ErrorResponse::new("storage_error", format!("Failed to load configuration: {}", e))
    })?;
    let secrets = CallbackSecrets::from(&config.wecom);

    match verify_and_decrypt(&challenge, &secrets) {
        Ok(echo) => {
            info!("Callback URL verified");
            Ok((StatusCode::OK, echo))
        }
        Err(e) if e.is_configuration() => {
            warn!(error = %e, "Callback secrets not usable");
            Err(ErrorResponse::new("invalid_config", e.to_string()))
        }
        Err(e) => Err(ErrorResponse::new("verification_failed", e.to_string())),
    }
}
