//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, thresholds > 0)
//! - Keep the rate-limit and forgery exemptions restricted to webhook routes
//! - Reject webhook paths the router cannot mount (duplicates, reserved routes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - A missing webhook secret is NOT a validation error: the webhook fails
//!   closed at request time while the rest of the app keeps serving

use thiserror::Error;

use crate::config::schema::{parse_network, ShieldConfig, ADMIN_KEY_PLACEHOLDER, RESERVED_ROUTES};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} entry {value:?} must start with '/'")]
    NotAPath { field: &'static str, value: String },

    #[error("{field} entry {value:?} is not a webhook path; only webhook routes may be exempted")]
    ExemptionNotWebhook { field: &'static str, value: String },

    #[error("duplicate webhook.paths entry {0:?}")]
    DuplicateWebhookPath(String),

    #[error("webhook path {0:?} collides with a route the server already serves")]
    ReservedWebhookPath(String),

    #[error("client_ip.trusted_proxies entry {0:?} is not an IP address or CIDR")]
    InvalidTrustedProxy(String),

    #[error("classifier signature with reason {0:?} has an empty pattern")]
    EmptyPattern(String),

    #[error("duplicate rate_limit.routes entry for {0:?}")]
    DuplicateRoute(String),

    #[error("admin.api_key must be changed before enabling the admin API")]
    PlaceholderAdminKey,

    #[error("webhook.paths must name at least one endpoint")]
    NoWebhookPath,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut nonzero = |value: u64, field: &'static str| {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    };
    nonzero(config.timeouts.request_secs, "timeouts.request_secs");
    nonzero(config.recon.threshold as u64, "recon.threshold");
    nonzero(config.recon.window_secs, "recon.window_secs");
    nonzero(config.recon.block_duration_secs, "recon.block_duration_secs");
    nonzero(config.recon.sweep_interval_secs, "recon.sweep_interval_secs");
    nonzero(config.rate_limit.requests as u64, "rate_limit.requests");
    nonzero(config.rate_limit.window_secs, "rate_limit.window_secs");
    nonzero(config.gate.sample_every, "gate.sample_every");
    nonzero(config.gate.sample_window_secs, "gate.sample_window_secs");
    nonzero(config.webhook.idempotency_capacity as u64, "webhook.idempotency_capacity");
    nonzero(config.webhook.idempotency_ttl_secs, "webhook.idempotency_ttl_secs");

    let mut seen_routes = Vec::new();
    for route in &config.rate_limit.routes {
        check_path(&mut errors, "rate_limit.routes", &route.path);
        if route.requests == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.routes.requests" });
        }
        if route.window_secs == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.routes.window_secs" });
        }
        if seen_routes.contains(&route.path) {
            errors.push(ValidationError::DuplicateRoute(route.path.clone()));
        }
        seen_routes.push(route.path.clone());
    }

    if config.webhook.paths.is_empty() {
        errors.push(ValidationError::NoWebhookPath);
    }
    let mut seen_webhooks = Vec::new();
    for path in &config.webhook.paths {
        check_path(&mut errors, "webhook.paths", path);
        if seen_webhooks.contains(path) {
            errors.push(ValidationError::DuplicateWebhookPath(path.clone()));
        }
        if RESERVED_ROUTES.contains(&path.as_str()) {
            errors.push(ValidationError::ReservedWebhookPath(path.clone()));
        }
        seen_webhooks.push(path.clone());
    }
    for (field, exempt) in [
        ("rate_limit.exempt", &config.rate_limit.exempt),
        ("forgery.exempt", &config.forgery.exempt),
    ] {
        for path in exempt {
            if !config.webhook.paths.contains(path) {
                errors.push(ValidationError::ExemptionNotWebhook {
                    field,
                    value: path.clone(),
                });
            }
        }
    }
    for proxy in &config.client_ip.trusted_proxies {
        if parse_network(proxy).is_none() {
            errors.push(ValidationError::InvalidTrustedProxy(proxy.clone()));
        }
    }
    for path in &config.gate.allowlist {
        check_path(&mut errors, "gate.allowlist", path);
    }
    check_path(&mut errors, "gate.static_prefix", &config.gate.static_prefix);
    check_path(&mut errors, "gate.api_prefix", &config.gate.api_prefix);

    for sig in &config.classifier.signatures {
        if sig.pattern.trim().is_empty() {
            errors.push(ValidationError::EmptyPattern(sig.reason.clone()));
        }
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key.expose() == ADMIN_KEY_PLACEHOLDER)
    {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::NotAPath {
            field,
            value: value.to_string(),
        });
    }
}
