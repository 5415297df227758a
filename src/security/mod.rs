//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (security response headers)
//!     → rate_limit.rs (per-IP window and bans)
//!     → api_keys.rs (per-key velocity)
//!     → integrity.rs (scanner UA, critical endpoints, pattern scan)
//!     → credentials::gate (provider-backed endpoints)
//!     → access_control.rs (tier checks, context)
//!     → response_filter.rs (strip fields on the way out)
//!     → pipeline.rs (request log line)
//!     → sanitizer.rs (JSON body tamper check)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a failed check answers immediately, later stages never run
//! - One shared [`SecurityState`] built per process, cloned into every layer

pub mod access_control;
pub mod api_keys;
pub mod headers;
pub mod integrity;
pub mod patterns;
pub mod pipeline;
pub mod rate_limit;
pub mod response_filter;
pub mod sanitizer;
pub mod sensitivity;

use std::sync::Arc;

use crate::config::GuardConfig;
use crate::credentials::CredentialValidator;

pub use api_keys::ApiKeyTracker;
pub use pipeline::SecurityPipeline;
pub use rate_limit::RateLimiter;
pub use sensitivity::{SensitivityClassifier, SensitivityTier, ValidationContext};

/// Shared state for every security stage.
#[derive(Clone)]
pub struct SecurityState {
    config: Arc<GuardConfig>,
    rate_limiter: Arc<RateLimiter>,
    api_keys: Arc<ApiKeyTracker>,
    classifier: Arc<SensitivityClassifier>,
    credentials: Arc<CredentialValidator>,
}

impl SecurityState {
    /// Build state with credential probes taken from the configuration.
    pub fn new(config: GuardConfig) -> Self {
        let validator = CredentialValidator::from_config(&config.credentials, &config.timeouts);
        Self::with_validator(config, validator)
    }

    pub fn with_validator(config: GuardConfig, validator: CredentialValidator) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            api_keys: Arc::new(ApiKeyTracker::new(&config.api_keys)),
            classifier: Arc::new(SensitivityClassifier::new(config.sensitivity.rules.clone())),
            credentials: Arc::new(validator),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn api_keys(&self) -> &ApiKeyTracker {
        &self.api_keys
    }

    pub fn classifier(&self) -> &SensitivityClassifier {
        &self.classifier
    }

    pub fn credentials(&self) -> &CredentialValidator {
        &self.credentials
    }
}
