//! Tier enforcement for classified requests.
//!
//! # Responsibilities
//! - Enforce the payload ceiling of the resolved tier
//! - Require identifying headers for sensitive data
//! - Restrict mutation content types
//! - Pin restricted endpoints to HTTPS and known origins
//! - Attach the tier and [`ValidationContext`] for downstream stages
//!
//! # Design Decisions
//! - A tier attached by an earlier layer is never replaced
//! - The fingerprint is computed for correlation only, never for blocking

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::config::{GuardConfig, SensitivityConfig};
use crate::http::request::{
    client_ip, header_str, request_id, X_FORWARDED_PROTO, X_SESSION_ID,
};
use crate::http::response::Rejection;
use crate::observability::logging::{mask_ip, truncate_path};
use crate::security::sensitivity::{
    fingerprint, AuthenticatedUser, SensitivityTier, ValidationContext,
};
use crate::security::SecurityState;

const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Run the tier checks against request metadata.
pub fn enforce(
    config: &GuardConfig,
    tier: SensitivityTier,
    method: &Method,
    headers: &HeaderMap,
) -> Result<(), Rejection> {
    check_content_length(&config.sensitivity, tier, headers)?;

    if tier >= SensitivityTier::Sensitive {
        for name in ["user-agent", "accept"] {
            if !headers.contains_key(name) {
                return Err(Rejection::MissingHeader { header: name });
            }
        }
    }

    if matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        check_content_type(&config.sensitivity, headers)?;
    }

    if tier == SensitivityTier::Restricted {
        if config.is_production()
            && !header_str(headers, X_FORWARDED_PROTO)
                .is_some_and(|p| p.trim().eq_ignore_ascii_case("https"))
        {
            return Err(Rejection::HttpsRequired);
        }
        let source = header_str(headers, header::ORIGIN.as_str())
            .or_else(|| header_str(headers, header::REFERER.as_str()));
        if !source.is_some_and(|s| is_allowed_origin(config, s)) {
            return Err(Rejection::InvalidOrigin);
        }
    }

    Ok(())
}

fn check_content_length(
    config: &SensitivityConfig,
    tier: SensitivityTier,
    headers: &HeaderMap,
) -> Result<(), Rejection> {
    let Some(raw) = headers.get(header::CONTENT_LENGTH) else {
        return Ok(());
    };
    let length: u64 = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or(Rejection::InvalidContentLength)?;
    let limit = config.max_bytes(tier);
    if length > limit {
        return Err(Rejection::PayloadTooLarge { limit });
    }
    Ok(())
}

fn check_content_type(config: &SensitivityConfig, headers: &HeaderMap) -> Result<(), Rejection> {
    let raw = header_str(headers, header::CONTENT_TYPE.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or(Rejection::MissingContentType)?;
    let media = raw.split(';').next().unwrap_or("").trim();
    if config
        .allowed_content_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(media))
    {
        Ok(())
    } else {
        Err(Rejection::UnsupportedContentType)
    }
}

/// True when `source` (an `Origin` or `Referer` value) points at a permitted host.
pub fn is_allowed_origin(config: &GuardConfig, source: &str) -> bool {
    let Ok(url) = Url::parse(source) else {
        return false;
    };
    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return false;
    };

    if !config.is_production() && LOCAL_HOSTS.contains(&host.as_str()) {
        if let Some(port) = url.port() {
            if config.sensitivity.dev_ports.contains(&port) {
                return true;
            }
        }
    }

    let configured_origin_host = config
        .sensitivity
        .allowed_origin
        .as_deref()
        .and_then(|o| Url::parse(o).ok())
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));

    config
        .sensitivity
        .allowed_host
        .as_deref()
        .map(|h| h.trim().to_ascii_lowercase())
        .into_iter()
        .chain(configured_origin_host)
        .filter(|allowed| !allowed.is_empty())
        .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
}

/// Classify, enforce and annotate each request.
pub async fn data_access_middleware(
    State(state): State<SecurityState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config();
    let tier = match request.extensions().get::<SensitivityTier>() {
        Some(existing) => *existing,
        None => state.classifier().classify(request.uri().path()),
    };

    let ip = client_ip(&request, config.listener.trust_forwarded_for);
    if let Err(rejection) = enforce(config, tier, request.method(), request.headers()) {
        tracing::warn!(
            path = %truncate_path(request.uri().path()),
            client = %mask_ip(&ip),
            tier = %tier,
            rule = rejection.code(),
            "Data access requirements not met"
        );
        return rejection.into_response();
    }

    let context = ValidationContext::new(
        tier,
        request_id(&request),
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|u| u.0.clone()),
        header_str(request.headers(), X_SESSION_ID).map(str::to_string),
        fingerprint(&ip, request.headers()),
    );

    let extensions = request.extensions_mut();
    if extensions.get::<SensitivityTier>().is_none() {
        extensions.insert(tier);
    }
    extensions.insert(context);

    next.run(request).await
}
