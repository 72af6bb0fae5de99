//! Early rejection gate.
//!
//! Runs ahead of every handler, in order:
//! 1. allowlisted path → pass
//! 2. banned client → 429 (never for the webhook)
//! 3. reconnaissance signature → 404
//! 4. dotfile under the static prefix → 404
//! 5. pass

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::config::ShieldConfig;
use crate::observability::metrics;
use crate::observability::{SecurityEventRecord, Severity};
use crate::security::classifier::{
    is_hidden_static, PathClassifier, Verdict, REASON_BLOCKED_CLIENT, REASON_HIDDEN_STATIC_FILE,
};
use crate::security::registry::BlockRegistry;
use crate::security::response::{is_api_path, rejection, Rejection};
use crate::security::shield::Shield;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Reject { rejection: Rejection, reason: String },
}

pub struct EarlyRejectionGate {
    allowlist: HashSet<String>,
    webhook_paths: HashSet<String>,
    static_prefix: String,
    classifier: ArcSwap<PathClassifier>,
    registry: Arc<BlockRegistry>,
}

impl EarlyRejectionGate {
    pub fn new(config: &ShieldConfig, registry: Arc<BlockRegistry>) -> Self {
        Self {
            allowlist: config.gate_allowlist().into_iter().collect(),
            webhook_paths: config.webhook.paths.iter().cloned().collect(),
            static_prefix: config.gate.static_prefix.clone(),
            classifier: ArcSwap::from_pointee(PathClassifier::from_config(&config.classifier)),
            registry,
        }
    }

    pub fn evaluate(&self, client: &str, path: &str) -> GateDecision {
        if self.allowlist.contains(path) {
            return GateDecision::Allow;
        }

        if !self.webhook_paths.contains(path) && self.registry.is_blocked(client) {
            return GateDecision::Reject {
                rejection: Rejection::TooManyRequests,
                reason: REASON_BLOCKED_CLIENT.to_string(),
            };
        }

        if let Verdict::Block { reason } = self.classifier.load().classify(path) {
            return GateDecision::Reject {
                rejection: Rejection::NotFound,
                reason,
            };
        }

        if is_hidden_static(path, &self.static_prefix) {
            return GateDecision::Reject {
                rejection: Rejection::NotFound,
                reason: REASON_HIDDEN_STATIC_FILE.to_string(),
            };
        }

        GateDecision::Allow
    }

    /// Swap in a freshly compiled signature set.
    pub fn replace_classifier(&self, classifier: PathClassifier) {
        self.classifier.store(Arc::new(classifier));
    }

    pub fn signature_count(&self) -> usize {
        self.classifier.load().len()
    }
}

pub async fn gate_middleware(
    State(shield): State<Arc<Shield>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = shield.resolver().resolve(&request);
    let path = request.uri().path();

    let (kind, reason) = match shield.gate().evaluate(client.as_str(), path) {
        GateDecision::Allow => return next.run(request).await,
        GateDecision::Reject { rejection, reason } => (rejection, reason),
    };

    metrics::record_blocked(&reason);
    let now = shield.clock().now_unix_sec();
    if shield.sampler().should_log(now) {
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        shield.sink().emit(
            Severity::Notice,
            &SecurityEventRecord::new(now, client.as_str(), path, &reason, user_agent),
        );
    }

    rejection(kind, is_api_path(path, shield.api_prefix()))
}
