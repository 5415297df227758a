//! Outgoing JSON field stripping by sensitivity tier.
//!
//! A blunt denylist: fields are matched by exact name at any depth,
//! regardless of which object they belong to.
//!
//! For sensitive and restricted requests the filter fails closed: a JSON
//! response it cannot read (content-encoded, unparsable or over the
//! configured ceiling) becomes a 500 instead of passing through unfiltered.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::http::request::{header_str, is_json_media, media_type};
use crate::http::response::Rejection;
use crate::security::sensitivity::SensitivityTier;
use crate::security::SecurityState;

pub const SENSITIVE_FIELDS: [&str; 5] = ["password", "token", "secret", "key", "hash"];
pub const INTERNAL_FIELDS: [&str; 4] = ["createdAt", "updatedAt", "internalId", "systemFlags"];

/// Remove denylisted fields from `value` in place.
pub fn filter_value(value: &mut Value, tier: SensitivityTier) {
    if tier < SensitivityTier::Sensitive {
        return;
    }
    strip(value, tier == SensitivityTier::Restricted);
}

fn strip(value: &mut Value, internal: bool) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| {
                !SENSITIVE_FIELDS.contains(&k.as_str())
                    && !(internal && INTERNAL_FIELDS.contains(&k.as_str()))
            });
            for v in map.values_mut() {
                strip(v, internal);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip(item, internal);
            }
        }
        _ => {}
    }
}

fn is_json_response(response: &Response) -> bool {
    media_type(response.headers()).is_some_and(|m| is_json_media(&m))
}

fn is_encoded(response: &Response) -> bool {
    header_str(response.headers(), header::CONTENT_ENCODING.as_str())
        .is_some_and(|enc| !enc.trim().eq_ignore_ascii_case("identity"))
}

/// Filter JSON responses according to the request's tier.
pub async fn response_filter_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let tier = request
        .extensions()
        .get::<SensitivityTier>()
        .copied()
        .unwrap_or(SensitivityTier::Public);

    let response = next.run(request).await;
    if tier < SensitivityTier::Sensitive || !is_json_response(&response) {
        return response;
    }
    if is_encoded(&response) {
        tracing::error!(tier = %tier, "Refusing content-encoded JSON response that cannot be filtered");
        return Rejection::Internal.into_response();
    }

    let limit = state.config().sensitivity.max_response_bytes;
    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, limit, "Failed to buffer response for filtering");
            return Rejection::Internal.into_response();
        }
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::from(bytes));
    }

    let mut value = match serde_json::from_slice::<Value>(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(tier = %tier, error = %e, "Refusing unparsable JSON response");
            return Rejection::Internal.into_response();
        }
    };
    filter_value(&mut value, tier);

    let filtered = match serde_json::to_vec(&value) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise filtered response");
            return Rejection::Internal.into_response();
        }
    };
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(filtered.len()));
    Response::from_parts(parts, Body::from(filtered))
}
