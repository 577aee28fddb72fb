use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::middleware::gate::{ValidatedKey, QUOTA_REMAINING_HEADER, USER_EMAIL_HEADER};
use crate::models::generation::{
    GenerationRequest, UserInfo, CHECKPOINT_FIELD, NEGATIVE_PROMPT_FIELD, NUM_IMAGES_FIELD,
    PROMPT_FIELD, SEED_FIELD, WORKFLOW_FIELD,
};
use crate::AppState;

/// POST /api/generate — forward the form to the generation backend.
/// Runs behind the API key gate, which has already stamped identity headers.
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    validated: Option<Extension<ValidatedKey>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user_info = UserInfo {
        email: header_string(&headers, USER_EMAIL_HEADER),
        quota_remaining: header_string(&headers, QUOTA_REMAINING_HEADER),
    };

    let role = validated
        .as_ref()
        .and_then(|Extension(ValidatedKey(result))| result.role)
        .map(|r| r.as_str());

    tracing::info!(
        handler = "generate",
        user = ?user_info.email,
        role = ?role,
        quota_remaining = ?user_info.quota_remaining,
        "Handler: POST /api/generate"
    );

    let request = GenerationRequest::from_multipart(multipart?).await?;

    tracing::debug!(
        handler = "generate",
        fields = request.fields.len(),
        image_bytes = request.image_bytes(),
        prompt_chars = request.text(PROMPT_FIELD).map_or(0, |p| p.chars().count()),
        negative_prompt_chars = request
            .text(NEGATIVE_PROMPT_FIELD)
            .map_or(0, |p| p.chars().count()),
        checkpoint = ?request.text(CHECKPOINT_FIELD),
        num_images = ?request.text(NUM_IMAGES_FIELD),
        seed = ?request.text(SEED_FIELD),
        workflow = ?request.text(WORKFLOW_FIELD),
        backend = %state.backend.url(),
        "Dispatching to generation backend"
    );

    let mut body = state.backend.generate(request).await?;

    let user_info = serde_json::to_value(user_info)
        .map_err(|e| AppError::UnknownFailure(e.to_string()))?;
    body.insert("user_info".to_string(), user_info);

    let results = result_count(&body);
    tracing::info!(
        handler = "generate",
        results,
        status = 200,
        "Responding: generation complete"
    );

    Ok(Json(Value::Object(body)))
}

/// Number of generated images, whether the backend lists them under
/// `results` or `images`.
fn result_count(body: &Map<String, Value>) -> usize {
    body.get("results")
        .or_else(|| body.get("images"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
