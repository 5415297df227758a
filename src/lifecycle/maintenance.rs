//! Periodic eviction of expired security state.
//!
//! Two independent loops, each selecting between its ticker and the shutdown
//! broadcast so no timer outlives the process.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::Shutdown;
use crate::security::SecurityState;

/// Evict expired rate-limit windows, bans and idle key usage.
pub fn sweep_clients(state: &SecurityState, now: Instant) -> usize {
    state.rate_limiter().sweep_at(now) + state.api_keys().sweep_at(now)
}

/// Evict expired credential validations.
pub fn sweep_credentials(state: &SecurityState, now: Instant) -> usize {
    state.credentials().cache().sweep_at(now)
}

async fn run_sweeper(
    name: &'static str,
    period: Duration,
    state: SecurityState,
    sweep: fn(&SecurityState, Instant) -> usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(sweeper = name, interval_secs = period.as_secs(), "Sweeper starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sweep(&state, Instant::now());
                if removed > 0 {
                    tracing::debug!(sweeper = name, removed, "Evicted expired entries");
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!(sweeper = name, "Sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Sweep period, never shorter than one second.
fn sweep_period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// Start both sweepers. They stop when `shutdown` fires.
pub fn spawn_sweepers(state: &SecurityState, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    let maintenance = &state.config().maintenance;
    vec![
        tokio::spawn(run_sweeper(
            "credentials",
            sweep_period(maintenance.credential_sweep_secs),
            state.clone(),
            sweep_credentials,
            shutdown.subscribe(),
        )),
        tokio::spawn(run_sweeper(
            "clients",
            sweep_period(maintenance.client_sweep_secs),
            state.clone(),
            sweep_clients,
            shutdown.subscribe(),
        )),
    ]
}
