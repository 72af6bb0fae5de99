//! Background expiry sweeper.
//!
//! A single task per process releases expired bans and prunes idle state.
//! Lookups already expire bans lazily; the sweep bounds memory for clients
//! that never come back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::security::shield::Shield;

pub async fn run_sweeper(
    shield: Arc<Shield>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Expiry sweeper starting");
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = shield.sweep();
                if report.bans_released > 0 || report.idle_clients > 0 {
                    tracing::debug!(
                        bans_released = report.bans_released,
                        idle_clients = report.idle_clients,
                        rate_windows = report.rate_windows,
                        "Sweep complete"
                    );
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Expiry sweeper stopping");
                break;
            }
        }
    }
}
