use std::time::Duration;

use serde_json::Value;

use crate::error::AppError;
use crate::models::generation::{BackendErrorBody, GenerationRequest};

/// Forwards generation forms to the image backend.
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    url: String,
}

impl GenerationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the form and return the backend's JSON object.
    ///
    /// A non-2xx answer becomes `BackendError` carrying the backend's own
    /// `error` text when it sent one. A 2xx answer that is not a JSON object
    /// is also a `BackendError`.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<serde_json::Map<String, Value>, AppError> {
        let form = request.into_form()?;

        let resp = self.http.post(&self.url).multipart(form).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body: BackendErrorBody = resp.json().await.unwrap_or_default();
            tracing::debug!(
                status = status.as_u16(),
                backend_error = ?body.error,
                "Backend returned an error status"
            );
            return Err(AppError::BackendError(
                body.error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| format!("backend error: {}", status.as_u16())),
            ));
        }

        match resp.json::<Value>().await {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AppError::BackendError(format!(
                "malformed backend response: expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(AppError::BackendError(format!(
                "malformed backend response: {e}"
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
