//! Request inspection helpers.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4) as early as possible
//! - Resolve the client identity (IP, bearer token)
//! - Read headers the pipeline consults
//! - Buffer bodies under a byte ceiling

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, Request},
};
use http_body_util::LengthLimitError;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::response::Rejection;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_SESSION_ID: &str = "x-session-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Layer assigning an `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer echoing the request id back on the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// The request id assigned upstream, or a fresh one.
pub fn request_id(req: &Request<Body>) -> String {
    header_str(req.headers(), X_REQUEST_ID)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Resolve the client IP for throttling decisions.
pub fn client_ip(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(first) = header_str(req.headers(), X_FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return first.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A header value as UTF-8, if present and printable.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Lowercased media type of the `content-type` header, without parameters.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::CONTENT_TYPE.as_str())
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
}

pub fn is_json_media(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

pub const FORM_MEDIA: &str = "application/x-www-form-urlencoded";

/// Read a whole request body, refusing more than `limit` bytes.
///
/// Only an exceeded limit maps to 413; a broken stream is a bad request.
pub async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, Rejection> {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if is_length_limit(&e) => Err(Rejection::PayloadTooLarge { limit: limit as u64 }),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            Err(Rejection::BodyUnreadable)
        }
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// True when the path is `prefix` itself or lies below it.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_sources() {
        let mut req = Request::builder()
            .header(X_FORWARDED_FOR, "198.51.100.4, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "198.51.100.4");
        assert_eq!(client_ip(&req, false), "unknown");

        let addr: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&req, false), "192.0.2.10");
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_buffer_body_distinguishes_limit_from_stream_errors() {
        let bytes = buffer_body(Body::from("0123456789"), 16).await.unwrap();
        assert_eq!(&bytes[..], b"0123456789");

        assert_eq!(
            buffer_body(Body::from("0123456789"), 4).await,
            Err(Rejection::PayloadTooLarge { limit: 4 })
        );

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"name\":")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let broken = Body::from_stream(futures_util::stream::iter(chunks));
        assert_eq!(buffer_body(broken, 1024).await, Err(Rejection::BodyUnreadable));
    }

    #[test]
    fn test_media_type() {
        let mut headers = HeaderMap::new();
        assert_eq!(media_type(&headers), None);
        headers.insert(
            header::CONTENT_TYPE,
            "Application/JSON; charset=utf-8".parse().unwrap(),
        );
        assert_eq!(media_type(&headers).as_deref(), Some("application/json"));
        assert!(is_json_media("application/merge-patch+json"));
        assert!(!is_json_media(FORM_MEDIA));
    }

    #[test]
    fn test_path_has_prefix_is_segment_aware() {
        assert!(path_has_prefix("/api/habits", "/api/habits"));
        assert!(path_has_prefix("/api/habits/7", "/api/habits"));
        assert!(path_has_prefix("/api/habits/7", "/api/habits/"));
        assert!(!path_has_prefix("/api/habitsextra", "/api/habits"));
        assert!(!path_has_prefix("/apiary", "/api"));
        assert!(path_has_prefix("/anything", "/"));
    }
}
