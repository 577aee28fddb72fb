use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::models::validation::ValidationResult;
use crate::util::key_prefix;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY_PARAM: &str = "api_key";

pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ORG_HEADER: &str = "x-user-org";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const QUOTA_REMAINING_HEADER: &str = "x-quota-remaining";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";

const ANNOTATION_HEADERS: [&str; 5] = [
    USER_EMAIL_HEADER,
    USER_ORG_HEADER,
    USER_ROLE_HEADER,
    QUOTA_REMAINING_HEADER,
    RATE_LIMIT_REMAINING_HEADER,
];

/// Extractor for the validation outcome of a gated request.
#[derive(Debug, Clone)]
pub struct ValidatedKey(pub ValidationResult);

pub fn is_protected(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
}

/// Find the caller's API key. The first non-empty of `x-api-key`,
/// `Authorization: Bearer <key>` and `?api_key=` wins.
pub fn extract_credential(req: &Request) -> Option<String> {
    let headers = req.headers();

    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let from_bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    };

    // Pairs rather than a struct: a repeated parameter must not make the
    // whole query unreadable. The first non-empty value wins.
    let from_query = || {
        Query::<Vec<(String, String)>>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(pairs)| {
                pairs
                    .into_iter()
                    .find(|(name, value)| name == API_KEY_QUERY_PARAM && !value.is_empty())
                    .map(|(_, value)| value)
            })
    };

    from_header
        .filter(|k| !k.is_empty())
        .or_else(|| from_bearer().filter(|k| !k.is_empty()))
        .map(str::to_owned)
        .or_else(from_query)
}

/// Gate requests under the protected prefixes behind a valid API key.
///
/// - No key anywhere: 401, the key manager is not called.
/// - Key manager unreachable or answering garbage: 503.
/// - Key rejected: 403.
/// - Key accepted: identity and quota are stamped as request headers for
///   the handler, replacing anything the client sent under those names.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    if !is_protected(&uri, &state.protected_prefixes) {
        return next.run(req).await;
    }

    let Some(api_key) = extract_credential(&req) else {
        tracing::warn!(
            method = %method,
            uri = %uri,
            "Gate: rejected, no API key supplied"
        );
        return AppError::Unauthenticated.into_response();
    };

    let result = match state.validator.try_validate(&api_key).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(
                api_key = %key_prefix(&api_key),
                method = %method,
                uri = %uri,
                error = %e,
                "Gate: key manager unavailable"
            );
            return AppError::ValidationServiceUnavailable(e.to_string()).into_response();
        }
    };

    if !result.valid {
        tracing::warn!(
            api_key = %key_prefix(&api_key),
            method = %method,
            uri = %uri,
            reason = %result.message,
            "Gate: rejected, key not valid"
        );
        return AppError::InvalidCredential(result.message).into_response();
    }

    tracing::debug!(
        api_key = %key_prefix(&api_key),
        method = %method,
        uri = %uri,
        quota_remaining = ?result.quota_remaining,
        "Gate: key valid, forwarding to handler"
    );

    annotate(req.headers_mut(), &result);
    req.extensions_mut().insert(ValidatedKey(result));
    next.run(req).await
}

/// Replace the annotation headers with values taken from `result`.
pub fn annotate(headers: &mut HeaderMap, result: &ValidationResult) {
    for name in ANNOTATION_HEADERS {
        headers.remove(name);
    }

    if let Some(identity) = &result.identity {
        set(headers, USER_EMAIL_HEADER, &identity.email);
        set(
            headers,
            USER_ORG_HEADER,
            identity.organization.as_deref().unwrap_or(""),
        );
    }
    if let Some(role) = result.role {
        set(headers, USER_ROLE_HEADER, role.as_str());
    }
    if let Some(quota) = result.quota_remaining {
        set(headers, QUOTA_REMAINING_HEADER, &quota.to_string());
    }
    if let Some(rate) = result.rate_limit_remaining {
        set(headers, RATE_LIMIT_REMAINING_HEADER, &rate.to_string());
    }
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => {
            tracing::warn!(header = name, "Gate: value not representable as a header, skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validation::{Identity, KeyRole};
    use axum::body::Body;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_header_beats_bearer_beats_query() {
        let req = request(
            "/api/generate?api_key=from-query",
            &[("x-api-key", "from-header"), ("authorization", "Bearer from-bearer")],
        );
        assert_eq!(extract_credential(&req).as_deref(), Some("from-header"));

        let req = request(
            "/api/generate?api_key=from-query",
            &[("authorization", "Bearer from-bearer")],
        );
        assert_eq!(extract_credential(&req).as_deref(), Some("from-bearer"));

        let req = request("/api/generate?api_key=from-query", &[]);
        assert_eq!(extract_credential(&req).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_empty_and_non_bearer_values_are_absent() {
        let req = request(
            "/api/generate?api_key=",
            &[("x-api-key", ""), ("authorization", "Basic dXNlcjpwYXNz")],
        );
        assert_eq!(extract_credential(&req), None);

        let req = request("/api/generate", &[("x-api-key", ""), ("authorization", "Bearer ")]);
        assert_eq!(extract_credential(&req), None);

        let req = request("/api/generate", &[("x-api-key", ""), ("authorization", "Bearer k2")]);
        assert_eq!(extract_credential(&req).as_deref(), Some("k2"));
    }

    #[test]
    fn test_repeated_query_key_is_still_a_credential() {
        let req = request("/api/generate?api_key=sk-proj-abc&api_key=sk-proj-abc", &[]);
        assert_eq!(extract_credential(&req).as_deref(), Some("sk-proj-abc"));

        let req = request("/api/generate?api_key=&api_key=sk-proj-second&api_key=x", &[]);
        assert_eq!(extract_credential(&req).as_deref(), Some("sk-proj-second"));

        let req = request("/api/generate?workflow=joger.json&api_key=sk%2Dproj%2Denc", &[]);
        assert_eq!(extract_credential(&req).as_deref(), Some("sk-proj-enc"));
    }

    #[test]
    fn test_is_protected_by_prefix() {
        let prefixes = vec!["/api/generate".to_string()];
        assert!(is_protected("/api/generate", &prefixes));
        assert!(is_protected("/api/generate/batch", &prefixes));
        assert!(!is_protected("/api/key-status", &prefixes));
        assert!(!is_protected("/health", &prefixes));
    }

    #[test]
    fn test_annotate_replaces_client_supplied_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("forged@example.com"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("superadmin"));

        let result = ValidationResult {
            valid: true,
            message: "ok".into(),
            identity: Some(Identity {
                email: "ana@example.com".into(),
                organization: None,
            }),
            role: None,
            quota_remaining: Some(60),
            rate_limit_remaining: None,
        };
        annotate(&mut headers, &result);

        assert_eq!(headers[USER_EMAIL_HEADER], "ana@example.com");
        assert_eq!(headers[USER_ORG_HEADER], "");
        assert_eq!(headers[QUOTA_REMAINING_HEADER], "60");
        assert!(headers.get(USER_ROLE_HEADER).is_none());
        assert!(headers.get(RATE_LIMIT_REMAINING_HEADER).is_none());

        let admin = ValidationResult {
            role: Some(KeyRole::Admin),
            ..result
        };
        annotate(&mut headers, &admin);
        assert_eq!(headers[USER_ROLE_HEADER], "admin");
    }
}
