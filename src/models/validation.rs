use serde::{Deserialize, Serialize};

/// Body sent to the key manager's validate endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateKeyRequest {
    pub api_key: String,
}

/// Role carried by a key record. Admin roles may manage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Superadmin,
    Admin,
    User,
    #[serde(other)]
    Unknown,
}

impl KeyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyRole::Superadmin => "superadmin",
            KeyRole::Admin => "admin",
            KeyRole::User => "user",
            KeyRole::Unknown => "unknown",
        }
    }

    pub fn can_manage_keys(self) -> bool {
        matches!(self, KeyRole::Superadmin | KeyRole::Admin)
    }
}

/// Key record as returned inside a validation response.
/// Only the fields the gateway reads are declared; the rest are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyInfo {
    pub user_email: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub role: Option<KeyRole>,
    #[serde(default)]
    pub daily_quota: i64,
    #[serde(default)]
    pub current_daily_usage: i64,
    #[serde(default)]
    pub rate_limit: i64,
}

impl KeyInfo {
    pub fn derived_remaining_quota(&self) -> i64 {
        self.daily_quota.saturating_sub(self.current_daily_usage)
    }
}

/// Key manager response, as it comes over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub key_info: Option<KeyInfo>,
    #[serde(default)]
    pub remaining_quota: Option<i64>,
    #[serde(default)]
    pub rate_limit_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
    pub organization: Option<String>,
}

/// Normalised outcome of validating one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub message: String,
    pub identity: Option<Identity>,
    pub role: Option<KeyRole>,
    pub quota_remaining: Option<i64>,
    pub rate_limit_remaining: Option<i64>,
}

impl ValidationResult {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            identity: None,
            role: None,
            quota_remaining: None,
            rate_limit_remaining: None,
        }
    }

    pub fn can_manage_keys(&self) -> bool {
        self.valid && self.role.is_some_and(KeyRole::can_manage_keys)
    }
}

impl From<ValidationResponse> for ValidationResult {
    fn from(resp: ValidationResponse) -> Self {
        let quota_remaining = resp.remaining_quota.or_else(|| {
            resp.key_info
                .as_ref()
                .map(KeyInfo::derived_remaining_quota)
        });
        let rate_limit_remaining = resp
            .rate_limit_remaining
            .or_else(|| resp.key_info.as_ref().map(|k| k.rate_limit));

        let (identity, role) = match resp.key_info {
            Some(info) => (
                Some(Identity {
                    email: info.user_email,
                    organization: info.organization,
                }),
                info.role,
            ),
            None => (None, None),
        };

        Self {
            valid: resp.valid,
            message: resp.message,
            identity,
            role,
            quota_remaining,
            rate_limit_remaining,
        }
    }
}

/// Response of the key status convenience route.
#[derive(Debug, Serialize)]
pub struct KeyStatusResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<KeyRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<i64>,
    pub can_manage_keys: bool,
}

impl From<ValidationResult> for KeyStatusResponse {
    fn from(result: ValidationResult) -> Self {
        let can_manage_keys = result.can_manage_keys();
        let (email, organization) = match result.identity {
            Some(identity) => (Some(identity.email), identity.organization),
            None => (None, None),
        };
        Self {
            valid: result.valid,
            message: result.message,
            email,
            organization,
            role: result.role,
            quota_remaining: result.quota_remaining,
            rate_limit_remaining: result.rate_limit_remaining,
            can_manage_keys,
        }
    }
}
