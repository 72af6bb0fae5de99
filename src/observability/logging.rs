//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Define the security event record and the sink it is written to
//! - Sample security logging under sustained attack
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Security records go to the `security` target so they can be routed
//!   separately with `RUST_LOG=security=warn`

use std::sync::Mutex;

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Upper bound on logged path / user-agent length.
const MAX_FIELD_LEN: usize = 256;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "scorebook_shield={level},security={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine rejection (path blocked, blocked client retrying).
    Notice,
    /// A client was banned.
    High,
}

/// One rejected or escalated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityEventRecord {
    pub timestamp: u64,
    pub client: String,
    pub path: String,
    pub reason: String,
    pub user_agent: Option<String>,
}

impl SecurityEventRecord {
    pub fn new(
        timestamp: u64,
        client: &str,
        path: &str,
        reason: &str,
        user_agent: Option<&str>,
    ) -> Self {
        Self {
            timestamp,
            client: client.to_string(),
            path: truncate(path),
            reason: reason.to_string(),
            user_agent: user_agent.map(truncate),
        }
    }
}

/// Cap an attacker-controlled field before it is stored or logged.
pub(crate) fn truncate(value: &str) -> String {
    value.chars().take(MAX_FIELD_LEN).collect()
}

/// Destination for security event records.
pub trait SecurityEventSink: Send + Sync {
    fn emit(&self, severity: Severity, record: &SecurityEventRecord);
}

/// Writes records through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SecurityEventSink for TracingSink {
    fn emit(&self, severity: Severity, record: &SecurityEventRecord) {
        let user_agent = record.user_agent.as_deref().unwrap_or("-");
        match severity {
            Severity::Notice => tracing::warn!(
                target: "security",
                timestamp = record.timestamp,
                client = %record.client,
                path = %record.path,
                reason = %record.reason,
                user_agent = %user_agent,
                "Request rejected"
            ),
            Severity::High => tracing::error!(
                target: "security",
                timestamp = record.timestamp,
                client = %record.client,
                path = %record.path,
                reason = %record.reason,
                user_agent = %user_agent,
                "Client banned"
            ),
        }
    }
}

#[derive(Debug, Default)]
struct SamplerWindow {
    started_at: u64,
    count: u64,
}

/// Decides which blocked requests get logged.
///
/// Every event is logged until `after` events have been seen inside the
/// current window; from then on only every `every`-th event is.
#[derive(Debug)]
pub struct LogSampler {
    after: u64,
    window_secs: u64,
    every: u64,
    state: Mutex<SamplerWindow>,
}

impl LogSampler {
    pub fn new(after: u64, window_secs: u64, every: u64) -> Self {
        Self {
            after,
            window_secs: window_secs.max(1),
            every: every.max(1),
            state: Mutex::new(SamplerWindow::default()),
        }
    }

    /// Count one event at `now` and report whether it should be logged.
    pub fn should_log(&self, now: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if now.saturating_sub(state.started_at) >= self.window_secs {
            state.started_at = now;
            state.count = 0;
        }
        state.count += 1;

        if state.count <= self.after {
            return true;
        }
        (state.count - self.after) % self.every == 0
    }

    /// Whether the current window has crossed into sampling mode.
    pub fn is_sampling(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.count > self.after
    }
}
