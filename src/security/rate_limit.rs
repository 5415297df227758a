//! Per-IP fixed-window rate limiting with temporary bans.
//!
//! A client gets `max_requests` per window. Going over the cap is refused
//! with a retry hint; going over twice the cap bans the client for
//! `ban_secs`, checked before any counting.
//!
//! This is a fixed window, not a sliding one: a burst straddling a window
//! boundary can see up to twice the nominal rate. That approximation is
//! accepted.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::request::client_ip;
use crate::http::response::Rejection;
use crate::observability::logging::mask_ip;
use crate::observability::metrics;
use crate::security::SecurityState;

/// Counter for one client in the current window.
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
    Blocked { retry_after: u64 },
}

/// Rate limiter state, shared by all requests.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    blocked: DashMap<String, Instant>,
    max_requests: u32,
    window: Duration,
    ban: Duration,
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            blocked: DashMap::new(),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            ban: Duration::from_secs(config.ban_secs),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Count a request from `client` at `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        if let Some(until) = self.blocked.get(client).map(|r| *r.value()) {
            if now < until {
                return RateDecision::Blocked {
                    retry_after: ceil_secs(until - now),
                };
            }
            self.blocked.remove(client);
        }

        // The entry guard holds the shard lock, so check-then-increment is atomic per key.
        let mut entry = self
            .entries
            .entry(client.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_reset_at: now + self.window,
            });

        if now > entry.window_reset_at {
            entry.count = 0;
            entry.window_reset_at = now + self.window;
        }
        entry.count = entry.count.saturating_add(1);

        let count = entry.count;
        let reset_at = entry.window_reset_at;
        drop(entry);

        if count <= self.max_requests {
            return RateDecision::Allowed {
                remaining: self.max_requests - count,
            };
        }

        if count > self.max_requests.saturating_mul(2) {
            self.blocked.insert(client.to_string(), now + self.ban);
            return RateDecision::Blocked {
                retry_after: ceil_secs(self.ban),
            };
        }

        RateDecision::Limited {
            retry_after: ceil_secs(reset_at.saturating_duration_since(now)),
        }
    }

    pub fn is_blocked_at(&self, client: &str, now: Instant) -> bool {
        self.blocked.get(client).map(|r| now < *r.value()).unwrap_or(false)
    }

    /// Evict finished windows and expired bans. Returns the number removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len() + self.blocked.len();
        self.entries.retain(|_, e| now <= e.window_reset_at);
        self.blocked.retain(|_, until| now < *until);
        let after = self.entries.len() + self.blocked.len();
        metrics::record_tracked_clients("rate_limit", self.entries.len());
        metrics::record_tracked_clients("blocked", self.blocked.len());
        before.saturating_sub(after)
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config().rate_limit.enabled {
        return next.run(request).await;
    }

    let ip = client_ip(&request, state.config().listener.trust_forwarded_for);
    let limiter = state.rate_limiter();

    match limiter.check(&ip) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        RateDecision::Limited { retry_after } => {
            tracing::warn!(client = %mask_ip(&ip), retry_after, "Rate limit exceeded");
            metrics::record_rate_limited("window");
            Rejection::RateLimited { retry_after }.into_response()
        }
        RateDecision::Blocked { retry_after } => {
            tracing::error!(client = %mask_ip(&ip), retry_after, "Blocked client refused");
            metrics::record_rate_limited("blocked");
            Rejection::IpBlocked { retry_after }.into_response()
        }
    }
}
