//! Request-integrity scan for `/api/*`.
//!
//! # Responsibilities
//! - Refuse known attack tooling by user-agent
//! - Refuse unauthenticated mutations of critical endpoints
//! - Scan body, query and path for attack patterns
//! - Decode form fields and JSON strings before matching
//!
//! # Design Decisions
//! - Applies to every method, not only mutations
//! - Body is buffered once and re-attached unchanged
//! - Logs carry truncated path and masked IP, never the payload

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::IntegrityConfig;
use serde_json::Value;

use crate::http::request::{
    bearer_token, buffer_body, client_ip, header_str, media_type, path_has_prefix, FORM_MEDIA,
    X_SESSION_ID,
};
use crate::http::response::Rejection;
use crate::observability::logging::{mask_ip, truncate_path};
use crate::security::patterns::{self, ThreatKind};
use crate::security::SecurityState;

/// True when the user-agent names a known scanner.
pub fn is_blocked_user_agent(config: &IntegrityConfig, user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    config
        .blocked_user_agents
        .iter()
        .any(|needle| ua.contains(&needle.to_ascii_lowercase()))
}

/// Scan the decoded path, query pairs and body.
///
/// The body is matched as raw text, then field by field once decoded:
/// form pairs for `application/x-www-form-urlencoded`, string keys and
/// values for anything that parses as JSON.
pub fn scan_request_parts(
    path: &str,
    query: Option<&str>,
    media: Option<&str>,
    body: &[u8],
) -> Option<ThreatKind> {
    let decoded_path = percent_decode(path);
    if let Some(threat) = patterns::detect(&decoded_path).or_else(|| patterns::detect(path)) {
        return Some(threat);
    }

    if let Some(query) = query {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            if let Some(threat) = patterns::detect(&k).or_else(|| patterns::detect(&v)) {
                return Some(threat);
            }
        }
        if let Some(threat) = patterns::detect(query) {
            return Some(threat);
        }
    }

    if body.is_empty() {
        return None;
    }
    if let Some(threat) = patterns::detect(&String::from_utf8_lossy(body)) {
        return Some(threat);
    }

    if media == Some(FORM_MEDIA) {
        return url::form_urlencoded::parse(body)
            .find_map(|(k, v)| patterns::detect(&k).or_else(|| patterns::detect(&v)));
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| scan_json(&value))
}

fn scan_json(value: &Value) -> Option<ThreatKind> {
    match value {
        Value::String(s) => patterns::detect(s),
        Value::Array(items) => items.iter().find_map(scan_json),
        Value::Object(map) => map
            .iter()
            .find_map(|(k, v)| patterns::detect(k).or_else(|| scan_json(v))),
        _ => None,
    }
}

fn percent_decode(input: &str) -> String {
    let escaped = input.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("p={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| input.to_string())
}

fn is_critical_violation(config: &IntegrityConfig, request: &Request<Body>) -> bool {
    let path = request.uri().path();
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if !mutating || !config.critical_paths.iter().any(|p| path_has_prefix(path, p)) {
        return false;
    }
    let has_session = header_str(request.headers(), X_SESSION_ID).is_some_and(|s| !s.is_empty());
    bearer_token(request.headers()).is_none() && !has_session
}

/// Middleware scanning `/api/*` requests for malicious content.
pub async fn integrity_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config().integrity;
    if !config.enabled || !path_has_prefix(request.uri().path(), "/api") {
        return next.run(request).await;
    }

    let ip = client_ip(&request, state.config().listener.trust_forwarded_for);
    let path = truncate_path(request.uri().path());

    let user_agent = header_str(request.headers(), header::USER_AGENT.as_str()).unwrap_or("");
    if is_blocked_user_agent(config, user_agent) {
        tracing::warn!(path = %path, client = %mask_ip(&ip), rule = "scanner_user_agent", "Automated client refused");
        return Rejection::SuspiciousUserAgent.into_response();
    }

    if is_critical_violation(config, &request) {
        tracing::warn!(path = %path, client = %mask_ip(&ip), rule = "critical_endpoint", "Unauthenticated mutation of critical endpoint");
        return Rejection::CriticalEndpoint.into_response();
    }

    let media = media_type(request.headers());
    let (parts, body) = request.into_parts();
    let bytes = match buffer_body(body, config.max_body_bytes).await {
        Ok(b) => b,
        Err(rejection) => return rejection.into_response(),
    };

    if let Some(threat) =
        scan_request_parts(parts.uri.path(), parts.uri.query(), media.as_deref(), &bytes)
    {
        tracing::warn!(
            path = %path,
            client = %mask_ip(&ip),
            rule = threat.code(),
            "Malicious pattern detected in request"
        );
        return Rejection::MaliciousContent { threat }.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_user_agents() {
        let config = IntegrityConfig::default();
        assert!(is_blocked_user_agent(&config, "sqlmap/1.7.2#stable (https://sqlmap.org)"));
        assert!(is_blocked_user_agent(&config, "Mozilla/5.00 (Nikto/2.1.6)"));
        assert!(!is_blocked_user_agent(&config, "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
        assert!(!is_blocked_user_agent(&config, ""));
    }

    #[test]
    fn test_scan_query() {
        assert_eq!(
            scan_request_parts("/api/habits", Some("q=%3Cscript%3Ealert(1)%3C%2Fscript%3E"), None, b""),
            Some(ThreatKind::Xss)
        );
        assert_eq!(
            scan_request_parts("/api/habits", Some("sort=name&order=asc"), None, b""),
            None
        );
    }

    #[test]
    fn test_scan_path_and_body() {
        assert_eq!(
            scan_request_parts("/api/files/..%2f..%2fetc%2fpasswd", None, None, b""),
            Some(ThreatKind::PathTraversal)
        );
        assert_eq!(
            scan_request_parts("/api/habits", None, None, br#"{"name":"x' OR 1=1 --"}"#),
            Some(ThreatKind::SqlInjection)
        );
        assert_eq!(
            scan_request_parts("/api/habits", None, None, br#"{"name":"Morning run"}"#),
            None
        );
    }

    #[test]
    fn test_scan_decodes_form_fields() {
        let form = Some(FORM_MEDIA);
        assert_eq!(
            scan_request_parts(
                "/api/habits",
                None,
                form,
                b"name=%3Cscript%3Ealert(1)%3C%2Fscript%3E&category=health"
            ),
            Some(ThreatKind::Xss)
        );
        assert_eq!(
            scan_request_parts("/api/habits", None, form, b"name=x%27+OR+%271%27%3D%271"),
            Some(ThreatKind::SqlInjection)
        );
        assert_eq!(
            scan_request_parts("/api/habits", None, form, b"name=%2E%2E%2F%2E%2E%2Fetc%2Fpasswd"),
            Some(ThreatKind::PathTraversal)
        );
        assert_eq!(
            scan_request_parts("/api/habits", None, form, b"name=Feed+the+dog+%26+cat"),
            None
        );
    }

    #[test]
    fn test_scan_decodes_json_escapes() {
        let body = br#"{"habit":{"tags":["ok","\u003cscript\u003ealert(1)\u003c/script\u003e"]}}"#;
        assert_eq!(
            scan_request_parts("/api/habits/3", None, None, body),
            Some(ThreatKind::Xss)
        );
    }

    #[test]
    fn test_critical_endpoint_rule() {
        let config = IntegrityConfig::default();
        let anonymous = Request::builder()
            .method(Method::POST)
            .uri("/api/admin/users")
            .body(Body::empty())
            .unwrap();
        assert!(is_critical_violation(&config, &anonymous));

        let with_session = Request::builder()
            .method(Method::POST)
            .uri("/api/admin/users")
            .header(X_SESSION_ID, "s-1")
            .body(Body::empty())
            .unwrap();
        assert!(!is_critical_violation(&config, &with_session));

        let read_only = Request::builder()
            .uri("/api/admin/users")
            .body(Body::empty())
            .unwrap();
        assert!(!is_critical_violation(&config, &read_only));
    }
}
