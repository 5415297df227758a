//! HTTP server setup.
//!
//! # Responsibilities
//! - Refuse configurations that fail validation
//! - Build the router: guard routes plus the upstream fallback
//! - Wrap it in the security pipeline
//! - Start background maintenance and startup credential checks
//! - Serve with connect info and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{validate_config, ConfigError, GuardConfig};
use crate::http::handlers;
use crate::http::proxy::{UpstreamError, UpstreamProxy};
use crate::lifecycle::{maintenance, shutdown, startup, Shutdown};
use crate::security::{SecurityPipeline, SecurityState};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// State injected into the guard's own handlers.
#[derive(Clone)]
pub struct AppState {
    pub security: SecurityState,
    pub upstream: Option<Arc<UpstreamProxy>>,
}

pub struct GuardServer {
    router: Router,
    state: SecurityState,
}

impl GuardServer {
    pub fn new(config: GuardConfig) -> Result<Self, ServerError> {
        Self::with_state(SecurityState::new(config))
    }

    /// Build around prepared state, e.g. with substituted credential probes.
    pub fn with_state(state: SecurityState) -> Result<Self, ServerError> {
        let config = state.config();
        validate_config(config).map_err(ConfigError::Validation)?;
        let upstream = match config.upstream.url.as_deref() {
            Some(url) => Some(Arc::new(UpstreamProxy::new(
                url,
                config.listener.trust_forwarded_for,
            )?)),
            None => None,
        };

        let app_state = AppState {
            security: state.clone(),
            upstream,
        };
        let routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/validate-keys", get(handlers::validate_keys))
            .fallback(handlers::fallback)
            .with_state(app_state);
        let router = SecurityPipeline::new(state.clone()).apply(routes);

        Ok(Self { router, state })
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &SecurityState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = ?self.state.config().environment,
            "Guard listening"
        );

        let sweepers = maintenance::spawn_sweepers(&self.state, shutdown);
        let startup_state = self.state.clone();
        tokio::spawn(async move {
            startup::validate_credentials(&startup_state).await;
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown.subscribe()))
            .await;

        // Serve can end on error without a signal; sweepers must still stop.
        shutdown.trigger();
        for handle in sweepers {
            let _ = handle.await;
        }
        tracing::info!("Guard stopped");
        result
    }
}
