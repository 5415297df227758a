//! Cached credential validation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CredentialsConfig, TimeoutConfig};
use crate::observability::metrics;

use super::cache::ValidationCache;
use super::probe::{CredentialProbe, OpenAiProbe, StripeProbe};
use super::{CredentialError, Provider, ValidationStatus};

pub struct CredentialValidator {
    probes: HashMap<Provider, Arc<dyn CredentialProbe>>,
    cache: ValidationCache,
}

impl CredentialValidator {
    pub fn new(cache: ValidationCache) -> Self {
        Self {
            probes: HashMap::new(),
            cache,
        }
    }

    /// Register (or replace) the probe for its provider.
    pub fn with_probe(mut self, probe: Arc<dyn CredentialProbe>) -> Self {
        self.probes.insert(probe.provider(), probe);
        self
    }

    /// Build probes for every key present in the configuration.
    pub fn from_config(config: &CredentialsConfig, timeouts: &TimeoutConfig) -> Self {
        let cache = ValidationCache::new(
            Duration::from_secs(config.success_ttl_secs),
            Duration::from_secs(config.failure_ttl_secs),
        );
        let timeout = Duration::from_secs(timeouts.credential_check_secs);
        let mut validator = Self::new(cache);

        if let Some(secret) = config.stripe_secret_key.as_deref().filter(|k| !k.is_empty()) {
            validator = validator.with_probe(Arc::new(StripeProbe::new(
                config.stripe_base_url.clone(),
                secret,
                config.stripe_public_key.clone().filter(|k| !k.is_empty()),
                timeout,
            )));
        }
        if let Some(key) = config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
            validator = validator.with_probe(Arc::new(OpenAiProbe::new(
                config.openai_base_url.clone(),
                key,
                timeout,
            )));
        }
        validator
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub async fn validate(&self, provider: Provider) -> ValidationStatus {
        self.validate_at(provider, Instant::now()).await
    }

    /// Cached outcome if fresh, otherwise probe and cache.
    pub async fn validate_at(&self, provider: Provider, now: Instant) -> ValidationStatus {
        if let Some(cached) = self.cache.get_at(provider, now) {
            return cached.status(provider);
        }

        let result = match self.probes.get(&provider) {
            Some(probe) => probe.probe().await,
            None => Err(CredentialError::NotConfigured),
        };

        match &result {
            Ok(()) => tracing::info!(provider = %provider, "Credential validated"),
            Err(e) => tracing::warn!(provider = %provider, error = %e, "Credential validation failed"),
        }
        metrics::record_credential_check(provider.as_str(), result.is_ok());

        self.cache.insert_at(provider, result, now).status(provider)
    }

    pub async fn validate_all(&self) -> Vec<ValidationStatus> {
        let now = Instant::now();
        let mut statuses = Vec::with_capacity(Provider::ALL.len());
        for provider in Provider::ALL {
            statuses.push(self.validate_at(provider, now).await);
        }
        statuses
    }

    /// Latest cached outcomes without triggering probes.
    pub fn snapshot(&self) -> Vec<ValidationStatus> {
        self.cache.latest()
    }
}
