//! Payment webhook endpoint.
//!
//! Verify over the raw bytes, gate on the idempotency record, then hand the
//! event to the effect handler. Every failure is mapped to a status code here
//! and never reaches the framework's error path.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::observability::metrics;
use crate::payments::idempotency::IdempotencyCache;
use crate::payments::processor::{EffectError, EventHandler};
use crate::payments::signature::{WebhookError, WebhookVerifier};

#[derive(Debug)]
pub enum WebhookOutcome {
    Processed { event_id: String },
    Duplicate { event_id: String },
    Rejected(WebhookError),
    Failed { event_id: String, error: EffectError },
}

impl WebhookOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookOutcome::Processed { .. } | WebhookOutcome::Duplicate { .. } => StatusCode::OK,
            WebhookOutcome::Rejected(e) if e.is_server_fault() => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookOutcome::Rejected(_) => StatusCode::BAD_REQUEST,
            WebhookOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "processed",
            WebhookOutcome::Duplicate { .. } => "duplicate",
            WebhookOutcome::Rejected(e) if e.is_server_fault() => "unconfigured",
            WebhookOutcome::Rejected(_) => "rejected",
            WebhookOutcome::Failed { .. } => "failed",
        }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        // Bodies carry no event detail or error text.
        let body = match &self {
            WebhookOutcome::Processed { .. } => json!({ "received": true }),
            WebhookOutcome::Duplicate { .. } => json!({ "received": true, "duplicate": true }),
            WebhookOutcome::Rejected(e) if e.is_server_fault() => json!({ "error": "internal_error" }),
            WebhookOutcome::Rejected(_) => json!({ "error": "bad_request" }),
            WebhookOutcome::Failed { .. } => json!({ "error": "internal_error" }),
        };
        (status, Json(body)).into_response()
    }
}

pub struct WebhookService {
    verifier: WebhookVerifier,
    processed: IdempotencyCache,
    handler: Arc<dyn EventHandler>,
    signature_header: String,
}

impl WebhookService {
    pub fn new(config: &WebhookConfig, clock: Arc<dyn Clock>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            verifier: WebhookVerifier::new(config, clock.clone()),
            processed: IdempotencyCache::from_config(config, clock),
            handler,
            signature_header: config.signature_header.to_ascii_lowercase(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.verifier.is_configured()
    }

    pub fn processed(&self) -> &IdempotencyCache {
        &self.processed
    }

    pub async fn process(&self, headers: &HeaderMap, body: &[u8]) -> WebhookOutcome {
        let signature = headers
            .get(self.signature_header.as_str())
            .and_then(|v| v.to_str().ok());

        let event = match self.verifier.verify(body, signature) {
            Ok(event) => event,
            Err(e) => return WebhookOutcome::Rejected(e),
        };

        if !self.processed.insert_if_absent(&event.id) {
            return WebhookOutcome::Duplicate { event_id: event.id };
        }

        match self.handler.handle(&event).await {
            Ok(()) => WebhookOutcome::Processed { event_id: event.id },
            Err(error) => {
                self.processed.forget(&event.id);
                WebhookOutcome::Failed { event_id: event.id, error }
            }
        }
    }
}

pub async fn webhook_handler(
    State(service): State<Arc<WebhookService>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> WebhookOutcome {
    let (outcome, body_len) = match body {
        Ok(body) => (service.process(&headers, &body).await, body.len()),
        Err(e) => {
            tracing::debug!(status = %e.status(), "Webhook body rejected by extractor");
            (WebhookOutcome::Rejected(WebhookError::UnreadableBody), 0)
        }
    };

    match &outcome {
        WebhookOutcome::Processed { event_id } => {
            tracing::info!(event_id = %event_id, "Webhook event processed");
        }
        WebhookOutcome::Duplicate { event_id } => {
            tracing::info!(event_id = %event_id, "Webhook event already processed");
        }
        WebhookOutcome::Rejected(e) if e.is_server_fault() => {
            tracing::error!(error = %e, "Webhook rejected: verification unavailable");
        }
        WebhookOutcome::Rejected(e) => {
            tracing::warn!(error = %e, body_len, "Webhook rejected");
        }
        WebhookOutcome::Failed { event_id, error } => {
            tracing::error!(event_id = %event_id, error = %error, "Webhook effect failed");
        }
    }
    metrics::record_webhook(outcome.metric_label());

    outcome
}
