//! Webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. The signed
//! message is `"<t>." ++ raw body`, authenticated with HMAC-SHA256 under the
//! endpoint secret. Verification always runs over the bytes as received.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::payments::types::Event;

type HmacSha256 = Hmac<Sha256>;

const SCHEME_V1: &str = "v1";

#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signing secret configured. The endpoint fails closed.
    #[error("webhook signing secret is not configured")]
    NotConfigured,

    /// Body exceeded the size limit or could not be buffered.
    #[error("request body could not be read")]
    UnreadableBody,

    #[error("signature header missing")]
    MissingSignature,

    #[error("signature header malformed")]
    MalformedSignature,

    #[error("no signature matched the payload")]
    SignatureMismatch,

    #[error("signature timestamp outside tolerance ({age_secs}s old)")]
    TimestampOutsideTolerance { age_secs: u64 },

    #[error("payload is not a valid event: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("event has an empty id")]
    MissingEventId,
}

impl WebhookError {
    /// Configuration problems are server faults; everything else is the caller's.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, WebhookError::NotConfigured)
    }
}

pub struct WebhookVerifier {
    secret: Option<Vec<u8>>,
    tolerance_secs: u64,
    clock: Arc<dyn Clock>,
}

impl WebhookVerifier {
    pub fn new(config: &WebhookConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = config
            .secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| s.expose().as_bytes().to_vec());
        if secret.is_none() {
            tracing::error!("Webhook signing secret missing; webhook endpoint will reject every delivery");
        }
        Self {
            secret,
            tolerance_secs: config.tolerance_secs,
            clock,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `body` against `header` and parse the event.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<Event, WebhookError> {
        let secret = self.secret.as_deref().ok_or(WebhookError::NotConfigured)?;
        let header = header.ok_or(WebhookError::MissingSignature)?;
        let (timestamp, candidates) = parse_header(header)?;

        let mac = keyed_mac(secret, timestamp, body)?;
        let matched = candidates
            .iter()
            .filter_map(|hex_sig| hex::decode(hex_sig).ok())
            .any(|sig| mac.clone().verify_slice(&sig).is_ok());
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        if self.tolerance_secs > 0 {
            let now = self.clock.now_unix_sec();
            let age_secs = now.abs_diff(timestamp);
            if age_secs > self.tolerance_secs {
                return Err(WebhookError::TimestampOutsideTolerance { age_secs });
            }
        }

        let event: Event = serde_json::from_slice(body)?;
        if event.id.trim().is_empty() {
            return Err(WebhookError::MissingEventId);
        }
        Ok(event)
    }
}

fn parse_header(header: &str) -> Result<(u64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| WebhookError::MalformedSignature)?,
                )
            }
            SCHEME_V1 => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(WebhookError::MalformedSignature),
    }
}

fn keyed_mac(secret: &[u8], timestamp: u64, body: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::NotConfigured)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Compute a signature header for `body`, as the provider would.
pub fn sign(secret: &str, timestamp: u64, body: &[u8]) -> Result<String, WebhookError> {
    let mac = keyed_mac(secret.as_bytes(), timestamp, body)?;
    Ok(format!(
        "t={},{}={}",
        timestamp,
        SCHEME_V1,
        hex::encode(mac.finalize().into_bytes())
    ))
}
