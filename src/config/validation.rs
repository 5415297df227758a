//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, limits, TTLs > 0)
//! - Check tier ceilings shrink as sensitivity grows
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GuardConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let rl = &config.rate_limit;
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if rl.ban_secs == 0 {
        errors.push(ValidationError::new("rate_limit.ban_secs", "must be greater than 0"));
    }

    let keys = &config.api_keys;
    if keys.max_requests_per_sec.is_nan() || keys.max_requests_per_sec <= 0.0 {
        errors.push(ValidationError::new("api_keys.max_requests_per_sec", "must be positive"));
    }
    if keys.min_sample_secs == 0 {
        errors.push(ValidationError::new("api_keys.min_sample_secs", "must be greater than 0"));
    }

    let s = &config.sensitivity;
    let ceilings = [
        s.public_max_bytes,
        s.internal_max_bytes,
        s.sensitive_max_bytes,
        s.restricted_max_bytes,
    ];
    if ceilings.iter().any(|&c| c == 0) {
        errors.push(ValidationError::new("sensitivity", "payload ceilings must be greater than 0"));
    }
    if ceilings.windows(2).any(|w| w[1] > w[0]) {
        errors.push(ValidationError::new(
            "sensitivity",
            "payload ceilings must not grow with sensitivity",
        ));
    }
    if s.max_response_bytes == 0 {
        errors.push(ValidationError::new(
            "sensitivity.max_response_bytes",
            "must be greater than 0",
        ));
    }
    for rule in &s.rules {
        if !rule.prefix.starts_with('/') {
            errors.push(ValidationError::new(
                "sensitivity.rules",
                format!("prefix '{}' must start with '/'", rule.prefix),
            ));
        }
    }
    if s.allowed_content_types.is_empty() {
        errors.push(ValidationError::new(
            "sensitivity.allowed_content_types",
            "at least one content type is required",
        ));
    }

    if config.integrity.max_body_bytes == 0 {
        errors.push(ValidationError::new("integrity.max_body_bytes", "must be greater than 0"));
    }

    let creds = &config.credentials;
    if creds.success_ttl_secs == 0 || creds.failure_ttl_secs == 0 {
        errors.push(ValidationError::new("credentials", "TTLs must be greater than 0"));
    }
    for (field, base) in [
        ("credentials.stripe_base_url", &creds.stripe_base_url),
        ("credentials.openai_base_url", &creds.openai_base_url),
    ] {
        if url::Url::parse(base).is_err() {
            errors.push(ValidationError::new(field, format!("'{}' is not a URL", base)));
        }
    }

    if config.maintenance.credential_sweep_secs == 0 || config.maintenance.client_sweep_secs == 0 {
        errors.push(ValidationError::new("maintenance", "sweep intervals must be greater than 0"));
    }

    if let Some(upstream) = &config.upstream.url {
        match url::Url::parse(upstream) {
            Ok(u) if u.scheme() == "http" && u.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(
                "upstream.url",
                format!("'{}' must be an http:// URL with a host", upstream),
            )),
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
