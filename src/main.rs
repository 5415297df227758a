//! HabitFlow request guard.
//!
//! ```text
//!     Client ──▶ listener ──▶ security pipeline ──▶ guard routes
//!                                   │                    │
//!                                   │                    └──▶ upstream app
//!                                   │
//!                     rate limit · key velocity · integrity
//!                     credential gate · tiers · response filter
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use habitflow_guard::config::{load_config, validate_config, ConfigError, GuardConfig};
use habitflow_guard::lifecycle::signals::shutdown_signal;
use habitflow_guard::observability::{logging, metrics};
use habitflow_guard::{GuardServer, Shutdown};

#[derive(Parser)]
#[command(name = "habitflow-guard")]
#[command(about = "Request validation and data-access guard for HabitFlow", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, env = "HABITFLOW_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    config.apply_env_overrides();
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "habitflow-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        rate_limit = config.rate_limit.max_requests,
        upstream = config.upstream.url.as_deref().unwrap_or("none"),
        credentials = ?config.credentials,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GuardServer::new(config)?;

    let shutdown = Arc::new(Shutdown::new());
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
