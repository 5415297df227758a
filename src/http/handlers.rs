//! Routes served by the guard itself.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::response::Rejection;
use crate::http::server::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "environment": state.security.config().environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Validate every provider (cache permitting) and report the outcome.
pub async fn validate_keys(State(state): State<AppState>) -> impl IntoResponse {
    let providers = state.security.credentials().validate_all().await;
    let valid = providers.iter().all(|s| s.valid);
    Json(json!({
        "valid": valid,
        "providers": providers,
    }))
}

/// Forward to the upstream application, or answer 404 when there is none.
pub async fn fallback(State(state): State<AppState>, request: Request<Body>) -> Response {
    match &state.upstream {
        Some(upstream) => upstream.forward(request).await,
        None => Rejection::NotFound.into_response(),
    }
}
