//! JSON and form body sanitizer.
//!
//! Sanitization is used as a tamper detector: a body that would change under
//! sanitization is refused outright, and a body that would not is forwarded
//! with its original bytes.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::http::request::{buffer_body, client_ip, is_json_media, media_type, FORM_MEDIA};
use crate::http::response::Rejection;
use crate::observability::logging::{mask_ip, truncate_path};
use crate::security::patterns::{self, ThreatKind};
use crate::security::SecurityState;

/// Recursively strip dangerous substrings from every string in `value`.
///
/// Returns the cleaned value and the first threat family that changed it.
pub fn sanitize_value(value: &Value) -> (Value, Option<ThreatKind>) {
    match value {
        Value::String(s) => {
            let (clean, threat) = patterns::strip(s);
            (Value::String(clean), threat)
        }
        Value::Array(items) => {
            let mut first = None;
            let cleaned = items
                .iter()
                .map(|item| {
                    let (clean, threat) = sanitize_value(item);
                    if first.is_none() {
                        first = threat;
                    }
                    clean
                })
                .collect();
            (Value::Array(cleaned), first)
        }
        Value::Object(map) => {
            let mut first = None;
            let cleaned = map
                .iter()
                .map(|(k, v)| {
                    let (clean, threat) = sanitize_value(v);
                    if first.is_none() {
                        first = threat;
                    }
                    (k.clone(), clean)
                })
                .collect();
            (Value::Object(cleaned), first)
        }
        other => (other.clone(), None),
    }
}

/// Check a raw JSON body. Unparsable bodies are left to the handler.
pub fn inspect_json_body(bytes: &[u8]) -> Result<(), ThreatKind> {
    let Ok(original) = serde_json::from_slice::<Value>(bytes) else {
        return Ok(());
    };
    let (sanitized, threat) = sanitize_value(&original);
    if sanitized != original {
        return Err(threat.unwrap_or(ThreatKind::Xss));
    }
    Ok(())
}

/// Check a form-urlencoded body: every decoded name and value must survive
/// sanitization unchanged.
pub fn inspect_form_body(bytes: &[u8]) -> Result<(), ThreatKind> {
    for (name, value) in url::form_urlencoded::parse(bytes) {
        for field in [name, value] {
            if let (_, Some(threat)) = patterns::strip(&field) {
                return Err(threat);
            }
        }
    }
    Ok(())
}

/// Refuse POST/PUT/PATCH JSON or form bodies that carry dangerous content.
pub async fn sanitize_input_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH) {
        return next.run(request).await;
    }
    let inspect: fn(&[u8]) -> Result<(), ThreatKind> = match media_type(request.headers()) {
        Some(media) if is_json_media(&media) => inspect_json_body,
        Some(media) if media == FORM_MEDIA => inspect_form_body,
        _ => return next.run(request).await,
    };

    let limit = state.config().integrity.max_body_bytes;
    let ip = client_ip(&request, state.config().listener.trust_forwarded_for);
    let (parts, body) = request.into_parts();
    let bytes = match buffer_body(body, limit).await {
        Ok(b) => b,
        Err(rejection) => return rejection.into_response(),
    };

    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::from(bytes))).await;
    }

    if let Err(threat) = inspect(&bytes) {
        tracing::warn!(
            path = %truncate_path(parts.uri.path()),
            client = %mask_ip(&ip),
            threat = threat.label(),
            "Rejected request body that failed sanitization"
        );
        return Rejection::MaliciousContent { threat }.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
