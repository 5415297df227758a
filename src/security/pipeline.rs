//! Layer wiring for the security stages.

use std::time::{Duration, Instant};

use axum::{body::Body, http::Request, middleware, middleware::Next, response::Response, Router};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::credentials::credential_gate_middleware;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::panic_response;
use crate::observability::logging::truncate_path;
use crate::observability::metrics;
use crate::security::{
    access_control::data_access_middleware, api_keys::api_key_middleware, headers,
    integrity::integrity_middleware, rate_limit::rate_limit_middleware,
    response_filter::response_filter_middleware, sanitizer::sanitize_input_middleware,
    sensitivity::ValidationContext, SecurityState, SensitivityTier,
};

pub struct SecurityPipeline {
    state: SecurityState,
}

impl SecurityPipeline {
    pub fn new(state: SecurityState) -> Self {
        Self { state }
    }

    /// Wrap `router` with every stage.
    ///
    /// `Router::layer` makes the last layer outermost, so stages are added
    /// innermost first.
    #[allow(deprecated)]
    pub fn apply(self, router: Router) -> Router {
        let state = self.state;
        let config = state.config();
        let production = config.is_production();
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);

        let router = router
            .layer(middleware::from_fn_with_state(
                state.clone(),
                sanitize_input_middleware,
            ))
            .layer(middleware::from_fn(request_log_middleware))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                response_filter_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                data_access_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                credential_gate_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                integrity_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                api_key_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .layer(CatchPanicLayer::custom(panic_response));

        headers::apply(router, production)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }
}

/// One info line per request that cleared the security stages.
pub async fn request_log_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = truncate_path(request.uri().path());
    let tier = request
        .extensions()
        .get::<SensitivityTier>()
        .copied()
        .unwrap_or(SensitivityTier::Public);
    let (request_id, fingerprint) = match request.extensions().get::<ValidationContext>() {
        Some(ctx) => (ctx.request_id.clone(), ctx.fingerprint.clone()),
        None => (request_id(&request), String::new()),
    };

    let response = next.run(request).await;
    let status = response.status().as_u16();

    tracing::info!(
        method = %method,
        path = %path,
        tier = %tier,
        request_id = %request_id,
        fingerprint = %fingerprint,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status, start);

    response
}
