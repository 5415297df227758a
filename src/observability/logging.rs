//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Render client identifiers and paths in a log-safe form
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - RUST_LOG overrides the configured default directive
//! - Never log full client IPs, bearer tokens or payloads

use std::net::IpAddr;

use sha2::{Digest, Sha256};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_LOGGED_PATH: usize = 100;

/// Initialize the global tracing subscriber.
pub fn init_logging(default_directive: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Mask the host part of an address: `203.0.113.7` → `203.0.113.x`.
pub fn mask_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let o = v4.octets();
            format!("{}.{}.{}.x", o[0], o[1], o[2])
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}:{:x}::x", s[0], s[1], s[2], s[3])
        }
        Err(_) => "unknown".to_string(),
    }
}

/// Cut a request path down to a bounded, single-line form.
pub fn truncate_path(path: &str) -> String {
    let cleaned: String = path
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_LOGGED_PATH)
        .collect();
    if path.chars().count() > MAX_LOGGED_PATH {
        format!("{}...", cleaned)
    } else {
        cleaned
    }
}

/// Short stable digest of a secret, safe to correlate in logs.
pub fn redact_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..4])
}
