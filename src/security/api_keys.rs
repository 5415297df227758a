//! Per-key request velocity tracking.
//!
//! Independent of the IP limiter: keyed on the presented bearer token (or
//! `anonymous`), it flags keys whose average rate stays above
//! `max_requests_per_sec`. Once a key collects more than
//! `suspicious_threshold` flags it is refused until its entry is evicted.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::ApiKeyConfig;
use crate::http::request::{bearer_token, path_has_prefix};
use crate::http::response::Rejection;
use crate::observability::logging::redact_key;
use crate::observability::metrics;
use crate::security::SecurityState;

pub const ANONYMOUS_KEY: &str = "anonymous";

#[derive(Debug, Clone, Copy)]
pub struct ApiKeyUsage {
    pub first_seen_at: Instant,
    pub last_used_at: Instant,
    pub request_count: u64,
    pub suspicious_activity_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDecision {
    Allowed,
    Suspicious,
}

pub struct ApiKeyTracker {
    usage: DashMap<String, ApiKeyUsage>,
    max_rate: f64,
    threshold: u32,
    min_sample: Duration,
    idle_eviction: Duration,
}

impl ApiKeyTracker {
    pub fn new(config: &ApiKeyConfig) -> Self {
        Self {
            usage: DashMap::new(),
            max_rate: config.max_requests_per_sec,
            threshold: config.suspicious_threshold,
            min_sample: Duration::from_secs(config.min_sample_secs),
            idle_eviction: Duration::from_secs(config.idle_eviction_secs),
        }
    }

    pub fn record(&self, key: &str) -> UsageDecision {
        self.record_at(key, Instant::now())
    }

    /// Record one request for `key` at `now`.
    pub fn record_at(&self, key: &str, now: Instant) -> UsageDecision {
        let mut usage = self.usage.entry(key.to_string()).or_insert(ApiKeyUsage {
            first_seen_at: now,
            last_used_at: now,
            request_count: 0,
            suspicious_activity_count: 0,
        });

        usage.request_count = usage.request_count.saturating_add(1);
        usage.last_used_at = now;

        // Short-lived keys are judged over at least `min_sample`.
        let elapsed = now
            .saturating_duration_since(usage.first_seen_at)
            .max(self.min_sample)
            .as_secs_f64();
        let rate = usage.request_count as f64 / elapsed;
        if rate > self.max_rate {
            usage.suspicious_activity_count = usage.suspicious_activity_count.saturating_add(1);
        }

        if usage.suspicious_activity_count > self.threshold {
            UsageDecision::Suspicious
        } else {
            UsageDecision::Allowed
        }
    }

    pub fn usage(&self, key: &str) -> Option<ApiKeyUsage> {
        self.usage.get(key).map(|r| *r.value())
    }

    /// Evict keys idle for longer than the eviction period.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.usage.len();
        let idle = self.idle_eviction;
        self.usage
            .retain(|_, u| now.saturating_duration_since(u.last_used_at) <= idle);
        metrics::record_tracked_clients("api_keys", self.usage.len());
        before.saturating_sub(self.usage.len())
    }
}

/// Refuse requests from keys with sustained abusive velocity.
pub async fn api_key_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config().api_keys;
    let path = request.uri().path();
    if !config.enabled
        || !path_has_prefix(path, "/api")
        || config.exempt_paths.iter().any(|p| path_has_prefix(path, p))
    {
        return next.run(request).await;
    }

    let key = bearer_token(request.headers()).unwrap_or(ANONYMOUS_KEY).to_string();
    match state.api_keys().record(&key) {
        UsageDecision::Allowed => next.run(request).await,
        UsageDecision::Suspicious => {
            let key_id = if key == ANONYMOUS_KEY {
                ANONYMOUS_KEY.to_string()
            } else {
                redact_key(&key)
            };
            tracing::warn!(key_id = %key_id, "Suspicious API key activity, request refused");
            metrics::record_rate_limited("api_key");
            Rejection::SuspiciousApiKey.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ApiKeyTracker {
        ApiKeyTracker::new(&ApiKeyConfig::default())
    }

    #[test]
    fn test_normal_usage_allowed() {
        let t = tracker();
        let start = Instant::now();
        // One request per second for five minutes
        for i in 0..300 {
            assert_eq!(
                t.record_at("token", start + Duration::from_secs(i)),
                UsageDecision::Allowed
            );
        }
        assert_eq!(t.usage("token").unwrap().suspicious_activity_count, 0);
    }

    #[test]
    fn test_burst_becomes_suspicious() {
        let t = tracker();
        let now = Instant::now();
        // 100 requests fit inside the 10 s sample at 10 req/s
        for _ in 0..100 {
            assert_eq!(t.record_at("burst", now), UsageDecision::Allowed);
        }
        // Requests 101..=110 are flagged but stay under the threshold
        for _ in 0..10 {
            assert_eq!(t.record_at("burst", now), UsageDecision::Allowed);
        }
        assert_eq!(t.record_at("burst", now), UsageDecision::Suspicious);

        // Stays refused even once the velocity drops
        let later = now + Duration::from_secs(3600);
        assert_eq!(t.record_at("burst", later), UsageDecision::Suspicious);
        // Other keys are unaffected
        assert_eq!(t.record_at("other", now), UsageDecision::Allowed);
    }

    #[test]
    fn test_sweep_evicts_idle_keys() {
        let t = tracker();
        let now = Instant::now();
        t.record_at("old", now);
        t.record_at("fresh", now + Duration::from_secs(20 * 3600));

        assert_eq!(t.sweep_at(now + Duration::from_secs(25 * 3600)), 1);
        assert!(t.usage("old").is_none());
        assert!(t.usage("fresh").is_some());
    }
}
