//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build state → Validate credentials
//!
//! Maintenance (maintenance.rs):
//!     Credential cache sweep (60 s) and client sweep (300 s) until shutdown
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → broadcast → sweepers exit, server drains
//! ```

pub mod maintenance;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
