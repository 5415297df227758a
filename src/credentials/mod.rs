//! Third-party credential validation.
//!
//! # Data Flow
//! ```text
//! startup / gate / /api/validate-keys
//!     → validator.rs (cache lookup, else probe)
//!     → format.rs (offline prefix/length/mode checks)
//!     → probe.rs (live call to the provider)
//!     → cache.rs (store with success or failure TTL)
//! ```
//!
//! # Design Decisions
//! - Keys are never logged, only provider names and outcomes
//! - Failures are cached for a shorter period than successes

pub mod cache;
pub mod format;
pub mod gate;
pub mod probe;
pub mod validator;

use serde::Serialize;
use thiserror::Error;

pub use cache::ValidationCache;
pub use gate::credential_gate_middleware;
pub use probe::{CredentialProbe, OpenAiProbe, StripeProbe};
pub use validator::CredentialValidator;

/// An external service whose key the guard validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    OpenAi,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Stripe, Provider::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Stripe => "Payment",
            Provider::OpenAi => "AI",
        }
    }

    /// Error code returned when a gated endpoint is refused.
    pub fn failure_code(&self) -> &'static str {
        match self {
            Provider::Stripe => "STRIPE_VALIDATION_FAILED",
            Provider::OpenAi => "OPENAI_VALIDATION_FAILED",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a credential was judged unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential is not configured")]
    NotConfigured,

    #[error("invalid key format: {0}")]
    InvalidFormat(String),

    #[error("secret and publishable keys are for different modes")]
    ModeMismatch,

    #[error("provider rejected the key")]
    AuthenticationFailed,

    #[error("key lacks the required permissions")]
    PermissionDenied,

    #[error("provider rate limit reached during validation")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected status {0} from provider")]
    UnexpectedStatus(u16),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Result of the latest validation for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatus {
    pub provider: Provider,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at_ms: u64,
}
