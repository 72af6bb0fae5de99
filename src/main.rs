//! Scorebook request shield.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──▶ request id / trace / timeout / body limit
//!     ──▶ recon tracker ─┐ (after response: count 404s, ban offenders)
//!     ──▶ early rejection gate (allowlist, bans, path signatures, dotfiles)
//!     ──▶ rate limiter (per client or identity, per route, exemptions)
//!     ──▶ forgery guard (unsafe methods, exemptions)
//!     ──▶ routes ── /webhooks/payments ──▶ verify ──▶ idempotency ──▶ effect
//!
//!     Background: expiry sweeper, config watcher (classifier reload)
//!     Side listeners: admin API, Prometheus metrics
//! ```
//!
//! Usage: `scorebook-shield [config.toml]`. Without a path, configuration
//! comes from defaults plus `SHIELD_*` environment variables.

use std::path::PathBuf;

use scorebook_shield::config::loader::{load_config, load_from_env};
use scorebook_shield::lifecycle;
use scorebook_shield::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match &config_path {
        Some(path) => load_config(path),
        None => load_from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("scorebook-shield: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scorebook-shield starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        recon_threshold = config.recon.threshold,
        recon_window_secs = config.recon.window_secs,
        block_duration_secs = config.recon.block_duration_secs,
        rate_limit = config.rate_limit.requests,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    lifecycle::run(config, config_path).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
