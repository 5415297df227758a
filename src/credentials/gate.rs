//! Refuse provider-backed endpoints while their credential is unusable.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CredentialsConfig;
use crate::http::request::path_has_prefix;
use crate::http::response::Rejection;
use crate::observability::logging::truncate_path;
use crate::security::SecurityState;

use super::Provider;

/// The provider an endpoint depends on, if any.
pub fn provider_for_path(config: &CredentialsConfig, path: &str) -> Option<Provider> {
    if config.stripe_paths.iter().any(|p| path_has_prefix(path, p)) {
        Some(Provider::Stripe)
    } else if config.openai_paths.iter().any(|p| path_has_prefix(path, p)) {
        Some(Provider::OpenAi)
    } else {
        None
    }
}

pub async fn credential_gate_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config().credentials;
    if !config.enabled {
        return next.run(request).await;
    }
    let Some(provider) = provider_for_path(config, request.uri().path()) else {
        return next.run(request).await;
    };

    let status = state.credentials().validate(provider).await;
    if !status.valid {
        tracing::warn!(
            path = %truncate_path(request.uri().path()),
            provider = %provider,
            error = status.error.as_deref().unwrap_or("unknown"),
            "Gated endpoint refused, credential unavailable"
        );
        return Rejection::CredentialUnavailable { provider }.into_response();
    }
    next.run(request).await
}
