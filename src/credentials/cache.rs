//! TTL cache of credential validation outcomes.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use super::{CredentialError, Provider, ValidationStatus};

#[derive(Debug, Clone)]
pub struct CachedValidation {
    pub result: Result<(), CredentialError>,
    pub checked_at: Instant,
    pub checked_at_ms: u64,
}

impl CachedValidation {
    pub fn status(&self, provider: Provider) -> ValidationStatus {
        ValidationStatus {
            provider,
            valid: self.result.is_ok(),
            error: self.result.as_ref().err().map(ToString::to_string),
            checked_at_ms: self.checked_at_ms,
        }
    }
}

pub struct ValidationCache {
    entries: DashMap<Provider, CachedValidation>,
    success_ttl: Duration,
    failure_ttl: Duration,
}

impl ValidationCache {
    pub fn new(success_ttl: Duration, failure_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            success_ttl,
            failure_ttl,
        }
    }

    fn ttl_for(&self, result: &Result<(), CredentialError>) -> Duration {
        if result.is_ok() {
            self.success_ttl
        } else {
            self.failure_ttl
        }
    }

    fn is_fresh(&self, entry: &CachedValidation, now: Instant) -> bool {
        now.saturating_duration_since(entry.checked_at) < self.ttl_for(&entry.result)
    }

    /// The cached outcome, if still within its TTL.
    pub fn get_at(&self, provider: Provider, now: Instant) -> Option<CachedValidation> {
        self.entries
            .get(&provider)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value().clone())
    }

    pub fn insert_at(
        &self,
        provider: Provider,
        result: Result<(), CredentialError>,
        now: Instant,
    ) -> CachedValidation {
        let checked_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let entry = CachedValidation {
            result,
            checked_at: now,
            checked_at_ms,
        };
        self.entries.insert(provider, entry.clone());
        entry
    }

    /// Latest outcome per provider regardless of age.
    pub fn latest(&self) -> Vec<ValidationStatus> {
        Provider::ALL
            .iter()
            .filter_map(|p| self.entries.get(p).map(|e| e.status(*p)))
            .collect()
    }

    /// Drop expired entries. Returns the number removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            now.saturating_duration_since(entry.checked_at) < self.ttl_for(&entry.result)
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
