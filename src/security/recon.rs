//! Reconnaissance tracking.
//!
//! Counts "not found" responses per client over a trailing window and bans
//! clients that cross the threshold.
//!
//! ```text
//! CLEAN ──(≥ threshold 404s within window)──▶ BLOCKED ──(block duration)──▶ CLEAN
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::config::ReconConfig;
use crate::observability::metrics;
use crate::observability::logging::truncate;
use crate::observability::{SecurityEventRecord, SecurityEventSink, Severity};
use crate::security::registry::BlockRegistry;
use crate::security::shield::Shield;

pub const REASON_RECON_THRESHOLD: &str = "recon_threshold";

/// One not-found response. The path is capped like logged paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconEvent {
    pub timestamp: u64,
    pub path: String,
}

/// Result of observing one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconOutcome {
    /// Not a 404; nothing recorded.
    Ignored,
    /// Recorded; `count` events now inside the window.
    Tracked { count: usize },
    /// Threshold crossed; client banned until `expires_at`.
    Blocked { expires_at: u64 },
}

pub struct ReconTracker {
    events: DashMap<String, VecDeque<ReconEvent>>,
    registry: Arc<BlockRegistry>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SecurityEventSink>,
    threshold: usize,
    window_secs: u64,
    block_duration_secs: u64,
}

impl ReconTracker {
    pub fn new(
        config: &ReconConfig,
        registry: Arc<BlockRegistry>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            events: DashMap::new(),
            registry,
            clock,
            sink,
            threshold: config.threshold.max(1),
            window_secs: config.window_secs,
            block_duration_secs: config.block_duration_secs,
        }
    }

    /// After-response hook.
    pub fn observe(
        &self,
        status: StatusCode,
        client: &str,
        path: &str,
        user_agent: Option<&str>,
    ) -> ReconOutcome {
        if status != StatusCode::NOT_FOUND {
            return ReconOutcome::Ignored;
        }
        self.record_not_found(client, path, user_agent)
    }

    /// Append a not-found event for `client` and escalate if needed.
    pub fn record_not_found(
        &self,
        client: &str,
        path: &str,
        user_agent: Option<&str>,
    ) -> ReconOutcome {
        let now = self.clock.now_unix_sec();

        let count = {
            let mut events = self.events.entry(client.to_string()).or_default();
            events.push_back(ReconEvent {
                timestamp: now,
                path: truncate(path),
            });
            while let Some(oldest) = events.front() {
                if now.saturating_sub(oldest.timestamp) < self.window_secs {
                    break;
                }
                events.pop_front();
            }
            events.len()
        };

        if count < self.threshold {
            tracing::debug!(client = %client, path = %path, count, "Not-found response tracked");
            return ReconOutcome::Tracked { count };
        }

        self.events.remove(client);
        let expires_at = self.registry.block(client, self.block_duration_secs);
        metrics::record_client_banned();
        metrics::record_active_blocks(self.registry.len());
        self.sink.emit(
            Severity::High,
            &SecurityEventRecord::new(now, client, path, REASON_RECON_THRESHOLD, user_agent),
        );
        ReconOutcome::Blocked { expires_at }
    }

    /// Events currently inside the window for `client`.
    pub fn event_count(&self, client: &str) -> usize {
        let now = self.clock.now_unix_sec();
        self.events
            .get(client)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| now.saturating_sub(e.timestamp) < self.window_secs)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop clients with no event inside the window. Returns how many.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now_unix_sec();
        let before = self.events.len();
        self.events.retain(|_, events| {
            events
                .back()
                .is_some_and(|latest| now.saturating_sub(latest.timestamp) < self.window_secs)
        });
        before.saturating_sub(self.events.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.events.len()
    }
}

/// Outermost layer: resolves the client, runs the request, then feeds the
/// response status to the tracker.
pub async fn recon_middleware(
    State(shield): State<Arc<Shield>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = shield.resolver().resolve(&request);
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    request.extensions_mut().insert(client.clone());

    let response = next.run(request).await;

    if let ReconOutcome::Blocked { expires_at } =
        shield
            .recon()
            .observe(response.status(), client.as_str(), &path, user_agent.as_deref())
    {
        tracing::warn!(client = %client, expires_at, "Reconnaissance threshold crossed");
    }
    response
}
