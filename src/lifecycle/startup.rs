//! Startup checks.

use crate::security::SecurityState;

/// Validate every provider once and log the outcome.
///
/// Failures are not fatal: gated endpoints answer 503 until a later check
/// succeeds.
pub async fn validate_credentials(state: &SecurityState) {
    if !state.config().credentials.enabled {
        tracing::info!("Credential validation disabled");
        return;
    }
    for status in state.credentials().validate_all().await {
        if status.valid {
            tracing::info!(provider = %status.provider, "Provider credential ready");
        } else {
            tracing::warn!(
                provider = %status.provider,
                error = status.error.as_deref().unwrap_or("unknown"),
                "Provider credential unavailable, dependent endpoints will answer 503"
            );
        }
    }
}
