//! Error responses produced by the security pipeline.
//!
//! Every rejection renders as JSON with a human message under `error` and a
//! stable machine-readable `code`, so callers can tell "your request is bad"
//! (4xx) from "our dependency is down" (503).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::credentials::Provider;
use crate::observability::metrics;
use crate::security::patterns::ThreatKind;

/// A request refused by one of the pipeline stages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Request contains potentially malicious content")]
    MaliciousContent { threat: ThreatKind },

    #[error("Missing required header: {header}")]
    MissingHeader { header: &'static str },

    #[error("Content-Type header is required")]
    MissingContentType,

    #[error("Content-Length header is invalid")]
    InvalidContentLength,

    #[error("Request body could not be read")]
    BodyUnreadable,

    #[error("Automated client detected")]
    SuspiciousUserAgent,

    #[error("Request origin is not allowed")]
    InvalidOrigin,

    #[error("Suspicious API key activity detected")]
    SuspiciousApiKey,

    #[error("Security requirements for this endpoint were not met")]
    CriticalEndpoint,

    #[error("Payload exceeds the {limit} byte limit for this endpoint")]
    PayloadTooLarge { limit: u64 },

    #[error("Unsupported content type")]
    UnsupportedContentType,

    #[error("HTTPS is required for this endpoint")]
    HttpsRequired,

    #[error("Too many requests, please try again later")]
    RateLimited { retry_after: u64 },

    #[error("Too many requests, client temporarily blocked")]
    IpBlocked { retry_after: u64 },

    #[error("{} service is temporarily unavailable", .provider.display_name())]
    CredentialUnavailable { provider: Provider },

    #[error("Upstream application is unavailable")]
    UpstreamUnavailable,

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MaliciousContent { .. }
            | Rejection::MissingHeader { .. }
            | Rejection::MissingContentType
            | Rejection::InvalidContentLength
            | Rejection::BodyUnreadable => StatusCode::BAD_REQUEST,
            Rejection::SuspiciousUserAgent
            | Rejection::InvalidOrigin
            | Rejection::SuspiciousApiKey
            | Rejection::CriticalEndpoint => StatusCode::FORBIDDEN,
            Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::HttpsRequired => StatusCode::UPGRADE_REQUIRED,
            Rejection::RateLimited { .. } | Rejection::IpBlocked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Rejection::CredentialUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MaliciousContent { .. } => "MALICIOUS_CONTENT_DETECTED",
            Rejection::MissingHeader { .. } => "MISSING_REQUIRED_HEADER",
            Rejection::MissingContentType => "MISSING_CONTENT_TYPE",
            Rejection::InvalidContentLength => "INVALID_CONTENT_LENGTH",
            Rejection::BodyUnreadable => "INVALID_REQUEST_BODY",
            Rejection::SuspiciousUserAgent => "SUSPICIOUS_USER_AGENT",
            Rejection::InvalidOrigin => "INVALID_ORIGIN",
            Rejection::SuspiciousApiKey => "SUSPICIOUS_API_KEY_ACTIVITY",
            Rejection::CriticalEndpoint => "CRITICAL_ENDPOINT_VIOLATION",
            Rejection::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Rejection::UnsupportedContentType => "UNSUPPORTED_CONTENT_TYPE",
            Rejection::HttpsRequired => "HTTPS_REQUIRED",
            Rejection::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Rejection::IpBlocked { .. } => "IP_TEMPORARILY_BLOCKED",
            Rejection::CredentialUnavailable { provider } => provider.failure_code(),
            Rejection::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Rejection::NotFound => "NOT_FOUND",
            Rejection::Internal => "INTERNAL_ERROR",
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Rejection::RateLimited { retry_after } | Rejection::IpBlocked { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".into(), json!(self.to_string()));
        body.insert("code".into(), json!(self.code()));
        match self {
            Rejection::MaliciousContent { threat } => {
                body.insert("threat".into(), json!(threat.code()));
            }
            Rejection::MissingHeader { header } => {
                body.insert("header".into(), json!(header));
            }
            Rejection::PayloadTooLarge { limit } => {
                body.insert("limit".into(), json!(limit));
            }
            Rejection::CredentialUnavailable { provider } => {
                body.insert("provider".into(), json!(provider.as_str()));
            }
            _ => {}
        }
        if let Some(secs) = self.retry_after() {
            body.insert("retryAfter".into(), json!(secs));
        }
        Value::Object(body)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        metrics::record_rejection(self.code());
        let mut response = (self.status(), Json(self.body())).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Renders a caught panic as the generic 500; the payload is logged, not returned.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    Rejection::Internal.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = Rejection::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");

        let body = body_json(response).await;
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["retryAfter"], 42);
    }

    #[tokio::test]
    async fn test_malicious_content_carries_threat() {
        let response = Rejection::MaliciousContent { threat: ThreatKind::Xss }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "MALICIOUS_CONTENT_DETECTED");
        assert_eq!(body["threat"], "XSS");
    }

    #[tokio::test]
    async fn test_credential_failure_code_names_provider() {
        let response = Rejection::CredentialUnavailable { provider: Provider::Stripe }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "STRIPE_VALIDATION_FAILED");
        assert_eq!(body["provider"], "stripe");
    }

    #[tokio::test]
    async fn test_panic_response_hides_details() {
        let response = panic_response(Box::new("db password leaked".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("password"));
    }
}
