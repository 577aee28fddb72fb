use axum::{extract::State, response::IntoResponse, Json};

use crate::models::validation::{KeyStatusResponse, ValidateKeyRequest};
use crate::util::key_prefix;
use crate::AppState;

/// POST /api/key-status — live feedback for a key typed into the browser.
///
/// Not gated and never consulted for authorization: it only reports what
/// the key manager says, and a failed lookup reads as `valid: false`.
pub async fn key_status(
    State(state): State<AppState>,
    Json(body): Json<ValidateKeyRequest>,
) -> impl IntoResponse {
    tracing::info!(
        handler = "key_status",
        api_key = %key_prefix(&body.api_key),
        "Handler: POST /api/key-status"
    );

    let result = state.validator.validate(&body.api_key).await;

    tracing::info!(
        handler = "key_status",
        api_key = %key_prefix(&body.api_key),
        valid = result.valid,
        status = 200,
        "Responding: key status"
    );

    Json(KeyStatusResponse::from(result))
}
