//! Anti-forgery (double-submit token) checks.
//!
//! Unsafe requests must echo the token from the anti-forgery cookie in a
//! header. Paths in the exemption list skip the check; the payment webhook is
//! the only default entry since its signature is verified downstream.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, Request},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::ForgeryConfig;
use crate::observability::metrics;
use crate::security::response::{is_api_path, rejection, Rejection};
use crate::security::shield::Shield;

#[derive(Debug, Clone)]
pub struct ForgeryGuard {
    enabled: bool,
    header_name: Option<HeaderName>,
    cookie_name: String,
    exempt: HashSet<String>,
}

impl ForgeryGuard {
    pub fn from_config(config: &ForgeryConfig) -> Self {
        Self {
            enabled: config.enabled,
            header_name: HeaderName::from_bytes(config.header_name.to_lowercase().as_bytes()).ok(),
            cookie_name: config.cookie_name.clone(),
            exempt: config.exempt.iter().cloned().collect(),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.contains(path)
    }

    /// Whether a request passes the anti-forgery check.
    pub fn check(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        if !self.enabled || method.is_safe() || self.is_exempt(path) {
            return true;
        }
        let Some(submitted) = self
            .header_name
            .as_ref()
            .and_then(|name| headers.get(name))
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let Some(issued) = cookie_value(headers, &self.cookie_name) else {
            return false;
        };
        !issued.is_empty() && bool::from(issued.as_bytes().ct_eq(submitted.as_bytes()))
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

pub async fn forgery_middleware(
    State(shield): State<Arc<Shield>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if shield
        .forgery()
        .check(request.method(), request.uri().path(), request.headers())
    {
        return next.run(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "Anti-forgery token missing or invalid");
    metrics::record_forgery_rejected();
    rejection(
        Rejection::BadRequest,
        is_api_path(request.uri().path(), shield.api_prefix()),
    )
}
