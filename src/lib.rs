//! HabitFlow request guard.
//!
//! Layered request validation and data-access control in front of the
//! HabitFlow application: pattern scanning, per-IP throttling, per-key
//! velocity tracking, sensitivity tiers with response filtering, and gating
//! of endpoints that depend on third-party credentials.

pub mod config;
pub mod credentials;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;
pub use security::SecurityState;
