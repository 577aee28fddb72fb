use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::validation::{ValidateKeyRequest, ValidationResponse, ValidationResult};
use crate::util::key_prefix;

const VALIDATE_PATH: &str = "/api/keys/validate";

/// Why a validation round trip produced no answer.
#[derive(Debug)]
pub enum ValidationError {
    Transport(reqwest::Error),
    Status(u16),
    Decode(reqwest::Error),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Transport(e) => write!(f, "key manager unreachable: {e}"),
            ValidationError::Status(code) => write!(f, "key manager returned HTTP {code}"),
            ValidationError::Decode(e) => write!(f, "malformed key manager response: {e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Checks API keys against the key-management service.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// One validation round trip. Failures to get an answer are kept apart
    /// from a negative answer.
    async fn try_validate(&self, api_key: &str) -> Result<ValidationResult, ValidationError>;

    /// Like `try_validate`, but a failed round trip becomes `valid: false`.
    async fn validate(&self, api_key: &str) -> ValidationResult {
        match self.try_validate(api_key).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    api_key = %key_prefix(api_key),
                    error = %e,
                    "Key validation failed, treating key as invalid"
                );
                ValidationResult::rejected(
                    "Unable to validate API key. API Key Manager may be unavailable.",
                )
            }
        }
    }
}

/// HTTP client for the key manager's `POST /api/keys/validate`.
#[derive(Clone)]
pub struct KeyManagerClient {
    http: reqwest::Client,
    validate_url: String,
}

impl KeyManagerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            validate_url: format!("{}{VALIDATE_PATH}", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl KeyValidator for KeyManagerClient {
    async fn try_validate(&self, api_key: &str) -> Result<ValidationResult, ValidationError> {
        tracing::debug!(
            api_key = %key_prefix(api_key),
            url = %self.validate_url,
            "Dispatching key validation"
        );

        let resp = self
            .http
            .post(&self.validate_url)
            .json(&ValidateKeyRequest {
                api_key: api_key.to_string(),
            })
            .send()
            .await
            .map_err(ValidationError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ValidationError::Status(status.as_u16()));
        }

        let body: ValidationResponse = resp.json().await.map_err(ValidationError::Decode)?;
        tracing::debug!(
            api_key = %key_prefix(api_key),
            valid = body.valid,
            "Key manager returned"
        );

        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> KeyManagerClient {
        KeyManagerClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_key_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/keys/validate"))
            .and(body_json(json!({ "api_key": "sk-proj-abc" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true,
                "message": "API key valid and ready to use",
                "key_info": {
                    "user_email": "ana@example.com",
                    "organization": null,
                    "daily_quota": 100,
                    "current_daily_usage": 1,
                    "rate_limit": 60
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).try_validate("sk-proj-abc").await.unwrap();
        assert!(result.valid);
        assert_eq!(result.quota_remaining, Some(99));
    }

    #[tokio::test]
    async fn test_every_call_goes_to_the_manager() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/keys/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": false,
                "message": "API key not found or inactive"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.validate("sk-proj-gone").await.valid);
        assert!(!client.validate("sk-proj-gone").await.valid);
    }

    #[tokio::test]
    async fn test_error_status_is_a_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server).try_validate("sk-proj-abc").await.unwrap_err();
        assert!(matches!(err, ValidationError::Status(500)));
    }

    #[tokio::test]
    async fn test_garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).try_validate("sk-proj-abc").await.unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }

    #[tokio::test]
    async fn test_validate_never_fails_when_manager_is_down() {
        // Nothing listens on port 9 on a test host.
        let client = KeyManagerClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

        assert!(matches!(
            client.try_validate("sk-proj-abc").await,
            Err(ValidationError::Transport(_))
        ));

        let result = client.validate("sk-proj-abc").await;
        assert!(!result.valid);
        assert!(result.message.contains("may be unavailable"));
    }
}
