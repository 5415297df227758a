//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::sensitivity::SensitivityTier;

/// Root configuration for the guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment. Production turns on HTTPS enforcement.
    pub environment: Environment,

    /// Per-IP fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Per-bearer-token velocity tracking.
    pub api_keys: ApiKeyConfig,

    /// Path sensitivity table and per-tier enforcement.
    pub sensitivity: SensitivityConfig,

    /// Request-integrity scan settings.
    pub integrity: IntegrityConfig,

    /// Third-party credential validation.
    pub credentials: CredentialsConfig,

    /// Background sweep intervals.
    pub maintenance: MaintenanceConfig,

    /// Upstream application for reverse-proxy mode.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl GuardConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Overlay deployment settings from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay settings from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(env) = non_empty("HABITFLOW_ENV").or_else(|| non_empty("NODE_ENV")) {
            self.environment = if env.eq_ignore_ascii_case("production") {
                Environment::Production
            } else {
                Environment::Development
            };
        }
        if let Some(host) = non_empty("ALLOWED_HOST") {
            self.sensitivity.allowed_host = Some(host);
        }
        if let Some(origin) = non_empty("ALLOWED_ORIGIN") {
            self.sensitivity.allowed_origin = Some(origin);
        }
        if let Some(key) = non_empty("STRIPE_SECRET_KEY") {
            self.credentials.stripe_secret_key = Some(key);
        }
        if let Some(key) = non_empty("STRIPE_PUBLIC_KEY").or_else(|| non_empty("VITE_STRIPE_PUBLIC_KEY")) {
            self.credentials.stripe_public_key = Some(key);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.credentials.openai_api_key = Some(key);
        }
        if let Some(url) = non_empty("UPSTREAM_URL") {
            self.upstream.url = Some(url);
        }
        if let Some(addr) = non_empty("GUARD_BIND_ADDRESS") {
            self.listener.bind_address = addr;
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Take the client IP from the first X-Forwarded-For entry.
    /// Only enable behind a trusted load balancer.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            trust_forwarded_for: false,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client IP per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Temporary ban length once a client exceeds twice the cap.
    pub ban_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
            ban_secs: 60 * 60,
        }
    }
}

/// API-key usage tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    pub enabled: bool,

    /// Velocity above which a request counts as suspicious.
    pub max_requests_per_sec: f64,

    /// Suspicious requests tolerated before the key is refused.
    pub suspicious_threshold: u32,

    /// Lower bound on the observation period used for the rate calculation.
    pub min_sample_secs: u64,

    /// Entries idle for this long are evicted by the sweep.
    pub idle_eviction_secs: u64,

    /// Paths that bypass the tracker.
    pub exempt_paths: Vec<String>,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_sec: 10.0,
            suspicious_threshold: 10,
            min_sample_secs: 10,
            idle_eviction_secs: 24 * 60 * 60,
            exempt_paths: vec!["/api/validate-keys".to_string()],
        }
    }
}

/// A single entry of the path sensitivity table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SensitivityRule {
    pub prefix: String,
    pub tier: SensitivityTier,
}

impl SensitivityRule {
    pub fn new(prefix: impl Into<String>, tier: SensitivityTier) -> Self {
        Self {
            prefix: prefix.into(),
            tier,
        }
    }
}

/// Data sensitivity classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Ordered (prefix, tier) table. The highest matching tier wins.
    pub rules: Vec<SensitivityRule>,

    pub public_max_bytes: u64,
    pub internal_max_bytes: u64,
    pub sensitive_max_bytes: u64,
    pub restricted_max_bytes: u64,

    /// Largest JSON response buffered for field filtering. Larger
    /// responses to sensitive or restricted requests are refused.
    pub max_response_bytes: usize,

    /// Media types accepted on POST/PUT/PATCH.
    pub allowed_content_types: Vec<String>,

    /// Host the application is served from; subdomains are accepted.
    pub allowed_host: Option<String>,

    /// Extra origin accepted for restricted endpoints (e.g. a staging UI).
    pub allowed_origin: Option<String>,

    /// Local front-end dev servers accepted outside production.
    pub dev_ports: Vec<u16>,
}

impl SensitivityConfig {
    pub fn max_bytes(&self, tier: SensitivityTier) -> u64 {
        match tier {
            SensitivityTier::Public => self.public_max_bytes,
            SensitivityTier::Internal => self.internal_max_bytes,
            SensitivityTier::Sensitive => self.sensitive_max_bytes,
            SensitivityTier::Restricted => self.restricted_max_bytes,
        }
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        use SensitivityTier::*;
        Self {
            rules: vec![
                SensitivityRule::new("/api", Internal),
                SensitivityRule::new("/api/achievements", Internal),
                SensitivityRule::new("/api/marketplace", Internal),
                SensitivityRule::new("/api/challenges", Internal),
                SensitivityRule::new("/api/habits", Sensitive),
                SensitivityRule::new("/api/completions", Sensitive),
                SensitivityRule::new("/api/user", Sensitive),
                SensitivityRule::new("/api/stats", Sensitive),
                SensitivityRule::new("/api/ai", Sensitive),
                SensitivityRule::new("/api/chat", Sensitive),
                SensitivityRule::new("/api/admin", Restricted),
                SensitivityRule::new("/api/subscription", Restricted),
                SensitivityRule::new("/api/payments", Restricted),
                SensitivityRule::new("/api/stripe", Restricted),
                SensitivityRule::new("/api/user/delete", Restricted),
            ],
            public_max_bytes: 2 * 1024 * 1024,
            internal_max_bytes: 1024 * 1024,
            sensitive_max_bytes: 512 * 1024,
            restricted_max_bytes: 256 * 1024,
            max_response_bytes: 8 * 1024 * 1024,
            allowed_content_types: vec![
                "application/json".to_string(),
                "application/x-www-form-urlencoded".to_string(),
                "multipart/form-data".to_string(),
                "text/plain".to_string(),
            ],
            allowed_host: None,
            allowed_origin: None,
            dev_ports: vec![3000, 5000, 5173],
        }
    }
}

/// Request-integrity scan configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub enabled: bool,

    /// Hard cap on buffered request bodies.
    pub max_body_bytes: usize,

    /// Case-insensitive user-agent fragments of known attack tooling.
    pub blocked_user_agents: Vec<String>,

    /// Endpoints where mutations must carry a bearer token or session id.
    pub critical_paths: Vec<String>,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: 2 * 1024 * 1024,
            blocked_user_agents: [
                "sqlmap", "nikto", "nmap", "masscan", "zgrab", "acunetix", "nessus", "dirbuster",
                "gobuster", "wpscan", "havij",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            critical_paths: vec![
                "/api/admin".to_string(),
                "/api/user/delete".to_string(),
                "/api/subscription/cancel".to_string(),
            ],
        }
    }
}

/// Third-party credential configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub enabled: bool,
    pub stripe_secret_key: Option<String>,
    pub stripe_public_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub stripe_base_url: String,
    pub openai_base_url: String,

    /// How long a successful validation is trusted.
    pub success_ttl_secs: u64,

    /// How long a failed validation is trusted.
    pub failure_ttl_secs: u64,

    pub stripe_paths: Vec<String>,
    pub openai_paths: Vec<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<redacted>" } else { "<unset>" };
        f.debug_struct("CredentialsConfig")
            .field("enabled", &self.enabled)
            .field("stripe_secret_key", &redact(&self.stripe_secret_key))
            .field("stripe_public_key", &redact(&self.stripe_public_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("stripe_base_url", &self.stripe_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("success_ttl_secs", &self.success_ttl_secs)
            .field("failure_ttl_secs", &self.failure_ttl_secs)
            .field("stripe_paths", &self.stripe_paths)
            .field("openai_paths", &self.openai_paths)
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stripe_secret_key: None,
            stripe_public_key: None,
            openai_api_key: None,
            stripe_base_url: "https://api.stripe.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            success_ttl_secs: 5 * 60,
            failure_ttl_secs: 60,
            stripe_paths: vec![
                "/api/subscription".to_string(),
                "/api/stripe".to_string(),
                "/api/payments".to_string(),
                "/api/billing".to_string(),
            ],
            openai_paths: vec![
                "/api/ai".to_string(),
                "/api/chat".to_string(),
                "/api/coaching".to_string(),
                "/api/tips".to_string(),
            ],
        }
    }
}

/// Background maintenance intervals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub credential_sweep_secs: u64,
    pub client_sweep_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            credential_sweep_secs: 60,
            client_sweep_secs: 5 * 60,
        }
    }
}

/// Upstream application settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the HabitFlow API (e.g., "http://127.0.0.1:5000").
    /// Unset means the guard only serves its built-in endpoints.
    pub url: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log directive when RUST_LOG is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "habitflow_guard=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Outbound credential-validation call timeout in seconds.
    pub credential_check_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            credential_check_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = GuardConfig::default();
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.sensitivity.max_bytes(SensitivityTier::Restricted), 256 * 1024);
        assert_eq!(config.credentials.success_ttl_secs, 300);
        assert_eq!(config.credentials.failure_ttl_secs, 60);
        assert!(!config.is_production());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NODE_ENV", "production"),
            ("ALLOWED_HOST", "habitflow.app"),
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
            ("OPENAI_API_KEY", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = GuardConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert!(config.is_production());
        assert_eq!(config.sensitivity.allowed_host.as_deref(), Some("habitflow.app"));
        assert_eq!(config.credentials.stripe_secret_key.as_deref(), Some("sk_test_abc"));
        // Blank values are ignored
        assert!(config.credentials.openai_api_key.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let mut config = CredentialsConfig::default();
        config.openai_api_key = Some("sk-very-secret-value-123456".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: GuardConfig = toml::from_str(
            r#"
            environment = "production"

            [rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert!(!config.sensitivity.rules.is_empty());
    }
}
