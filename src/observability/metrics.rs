//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_blocked_total` (counter): gate rejections by reason
//! - `shield_clients_banned_total` (counter): reconnaissance bans issued
//! - `shield_active_blocks` (gauge): live ban entries
//! - `shield_rate_limited_total` (counter): limiter denials by bucket
//! - `shield_forgery_rejected_total` (counter): anti-forgery rejections
//! - `shield_webhook_events_total` (counter): webhook outcomes
//! - `shield_idempotency_entries` (gauge): remembered event ids
//!
//! Rate-limit denials are only counted here, never logged per request.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_blocked(reason: &str) {
    counter!("shield_requests_blocked_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_client_banned() {
    counter!("shield_clients_banned_total").increment(1);
}

pub fn record_active_blocks(count: usize) {
    gauge!("shield_active_blocks").set(count as f64);
}

pub fn record_rate_limited(bucket: &str) {
    counter!("shield_rate_limited_total", "bucket" => bucket.to_string()).increment(1);
}

pub fn record_forgery_rejected() {
    counter!("shield_forgery_rejected_total").increment(1);
}

pub fn record_webhook(outcome: &'static str) {
    counter!("shield_webhook_events_total", "outcome" => outcome).increment(1);
}

pub fn record_idempotency_size(size: usize) {
    gauge!("shield_idempotency_entries").set(size as f64);
}
