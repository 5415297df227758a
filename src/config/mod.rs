//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → GuardConfig::apply_env_overrides (deployment secrets, environment)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets come from the environment and are never printed

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiKeyConfig, CredentialsConfig, Environment, GuardConfig, IntegrityConfig, ListenerConfig,
    MaintenanceConfig, ObservabilityConfig, RateLimitConfig, SensitivityConfig, SensitivityRule,
    TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
