//! Forwarding of requests that cleared the pipeline to the application.
//!
//! # Responsibilities
//! - Rewrite scheme and authority to the configured upstream
//! - Strip hop-by-hop headers in both directions
//! - Ask the upstream for identity-encoded bodies so the response filter
//!   can read them
//! - Stream the upstream response back unchanged
//!
//! # Design Decisions
//! - No retries: a failed forward surfaces as 502 immediately
//! - The response filter wraps this handler, so upstream JSON is still
//!   stripped according to the request's tier

use std::str::FromStr;

use axum::{
    body::Body,
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderMap, HeaderName, HeaderValue, Request, Uri,
    },
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::request::{client_ip, request_id, X_FORWARDED_FOR, X_REQUEST_ID};
use crate::http::response::Rejection;
use crate::observability::logging::truncate_path;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

#[derive(Debug)]
pub struct UpstreamError(String);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid upstream URL: {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

/// HTTP client bound to one upstream origin.
#[derive(Clone)]
pub struct UpstreamProxy {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    trust_forwarded_for: bool,
}

impl UpstreamProxy {
    pub fn new(url: &str, trust_forwarded_for: bool) -> Result<Self, UpstreamError> {
        let uri = Uri::from_str(url).map_err(|e| UpstreamError(e.to_string()))?;
        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| UpstreamError("missing scheme".into()))?;
        if scheme != Scheme::HTTP {
            return Err(UpstreamError("only plain http upstreams are supported".into()));
        }
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| UpstreamError("missing host".into()))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
            trust_forwarded_for,
        })
    }

    fn upstream_uri(&self, original: &Uri) -> Result<Uri, Rejection> {
        let path_and_query = original
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        let joined = format!("{}{}", self.base_path, path_and_query);
        let path_and_query = PathAndQuery::from_str(&joined).map_err(|_| Rejection::Internal)?;

        let mut parts = axum::http::uri::Parts::default();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts).map_err(|_| Rejection::Internal)
    }

    /// Forward `request` and return the upstream response.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let request_id = request_id(&request);
        let ip = client_ip(&request, self.trust_forwarded_for);
        let path = truncate_path(request.uri().path());

        let (mut parts, body) = request.into_parts();
        parts.uri = match self.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(rejection) => return rejection.into_response(),
        };
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::ACCEPT_ENCODING);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            parts.headers.insert(X_REQUEST_ID, value);
        }
        if let Ok(value) = HeaderValue::from_str(&ip) {
            parts.headers.append(X_FORWARDED_FOR, value);
        }

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, path = %path, error = %e, "Upstream request failed");
                Rejection::UpstreamUnavailable.into_response()
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
