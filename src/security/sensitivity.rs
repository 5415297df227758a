//! Data sensitivity classification.
//!
//! # Responsibilities
//! - Map request paths to one of four ordered tiers
//! - Build the per-request validation context
//! - Derive a client fingerprint for anomaly correlation
//!
//! # Design Decisions
//! - The table is an explicit ordered list of (prefix, tier) pairs
//! - All matching prefixes are considered and the highest tier wins,
//!   so the result never depends on table order
//! - Prefix matching is segment-aware: `/api/habits` does not match `/api/habitsx`

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SensitivityRule;
use crate::http::request::{header_str, path_has_prefix};

/// How strictly a request and its response are validated and filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityTier {
    Public = 0,
    Internal = 1,
    Sensitive = 2,
    Restricted = 3,
}

impl SensitivityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityTier::Public => "public",
            SensitivityTier::Internal => "internal",
            SensitivityTier::Sensitive => "sensitive",
            SensitivityTier::Restricted => "restricted",
        }
    }
}

impl std::fmt::Display for SensitivityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static path-prefix table.
#[derive(Debug, Clone)]
pub struct SensitivityClassifier {
    rules: Vec<SensitivityRule>,
}

impl SensitivityClassifier {
    pub fn new(rules: Vec<SensitivityRule>) -> Self {
        Self { rules }
    }

    /// Highest tier among all matching prefixes; PUBLIC when none match.
    pub fn classify(&self, path: &str) -> SensitivityTier {
        self.rules
            .iter()
            .filter(|rule| path_has_prefix(path, &rule.prefix))
            .map(|rule| rule.tier)
            .max()
            .unwrap_or(SensitivityTier::Public)
    }
}

/// Transient per-request metadata attached during classification.
///
/// The tier is fixed at construction and only readable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: String,
    pub timestamp_ms: u64,
    pub fingerprint: String,
    tier: SensitivityTier,
}

impl ValidationContext {
    pub fn new(
        tier: SensitivityTier,
        request_id: String,
        user_id: Option<String>,
        session_id: Option<String>,
        fingerprint: String,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            user_id,
            session_id,
            request_id,
            timestamp_ms,
            fingerprint,
            tier,
        }
    }

    pub fn tier(&self) -> SensitivityTier {
        self.tier
    }
}

/// Identity established by an authentication layer ahead of the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Truncated SHA-256 over the client IP and identifying headers.
pub fn fingerprint(ip: &str, headers: &HeaderMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    for name in ["user-agent", "accept", "accept-language", "accept-encoding"] {
        hasher.update(b"|");
        hasher.update(header_str(headers, name).unwrap_or("").as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensitivityConfig;

    fn classifier() -> SensitivityClassifier {
        SensitivityClassifier::new(SensitivityConfig::default().rules)
    }

    #[test]
    fn test_tier_ordering() {
        assert!(SensitivityTier::Public < SensitivityTier::Internal);
        assert!(SensitivityTier::Internal < SensitivityTier::Sensitive);
        assert!(SensitivityTier::Sensitive < SensitivityTier::Restricted);
    }

    #[test]
    fn test_highest_matching_tier_wins() {
        let c = classifier();
        assert_eq!(c.classify("/api/habits"), SensitivityTier::Sensitive);
        assert_eq!(c.classify("/api/habits/12/complete"), SensitivityTier::Sensitive);
        assert_eq!(c.classify("/api/user/delete"), SensitivityTier::Restricted);
        assert_eq!(c.classify("/api/user/profile"), SensitivityTier::Sensitive);
        assert_eq!(c.classify("/api/achievements"), SensitivityTier::Internal);
        assert_eq!(c.classify("/api/validate-keys"), SensitivityTier::Internal);
        assert_eq!(c.classify("/"), SensitivityTier::Public);
        assert_eq!(c.classify("/assets/app.js"), SensitivityTier::Public);
    }

    #[test]
    fn test_classification_ignores_table_order() {
        let mut rules = SensitivityConfig::default().rules;
        rules.reverse();
        let reversed = SensitivityClassifier::new(rules);
        let c = classifier();
        for path in ["/api/habits", "/api/user/delete", "/api/stats/weekly", "/health"] {
            assert_eq!(c.classify(path), reversed.classify(path));
            // Idempotent
            assert_eq!(c.classify(path), c.classify(path));
        }
    }

    #[test]
    fn test_fingerprint() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "Mozilla/5.0".parse().unwrap());
        headers.insert("accept", "application/json".parse().unwrap());

        let a = fingerprint("192.0.2.1", &headers);
        assert_eq!(a.len(), 16);
        assert_eq!(a, fingerprint("192.0.2.1", &headers));
        assert_ne!(a, fingerprint("192.0.2.2", &headers));
    }

    #[test]
    fn test_context_keeps_tier() {
        let ctx = ValidationContext::new(
            SensitivityTier::Restricted,
            "req-1".into(),
            None,
            Some("sess".into()),
            "abcd".into(),
        );
        assert_eq!(ctx.tier(), SensitivityTier::Restricted);
        assert!(ctx.timestamp_ms > 0);
    }
}
