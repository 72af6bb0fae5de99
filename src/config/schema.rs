//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Root configuration for the request-defense pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// How the client identifier is derived.
    pub client_ip: ClientIpConfig,

    /// Early rejection gate settings.
    pub gate: GateConfig,

    /// Reconnaissance path signatures.
    pub classifier: ClassifierConfig,

    /// Reconnaissance tracking and ban settings.
    pub recon: ReconConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Anti-forgery token checks.
    pub forgery: ForgeryConfig,

    /// Payment-provider webhook settings.
    pub webhook: WebhookConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Client identity derivation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientIpConfig {
    /// Header set by the fronting proxy. `None` disables it entirely.
    pub forwarded_header: Option<String>,

    /// Peers (IPs or CIDRs) whose forwarded header is believed. Empty means
    /// only the transport peer address identifies a client.
    pub trusted_proxies: Vec<String>,
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            forwarded_header: Some("x-forwarded-for".to_string()),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Parse a trusted-proxy entry: CIDR notation or a bare address.
pub fn parse_network(value: &str) -> Option<IpNet> {
    let value = value.trim();
    value
        .parse::<IpNet>()
        .ok()
        .or_else(|| value.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Early rejection gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Paths that bypass the gate entirely. Webhook paths are always added.
    pub allowlist: Vec<String>,

    /// Prefix under which hidden files are never served.
    pub static_prefix: String,

    /// Prefix that marks API-style paths (JSON rejections).
    pub api_prefix: String,

    /// Blocked requests within one sampling window before log sampling kicks in.
    pub sample_after: u64,

    /// Length of the sampling window in seconds.
    pub sample_window_secs: u64,

    /// Once sampling, log only every Nth blocked request.
    pub sample_every: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowlist: vec![
                "/health".to_string(),
                "/robots.txt".to_string(),
                "/favicon.ico".to_string(),
            ],
            static_prefix: "/static/".to_string(),
            api_prefix: "/api/".to_string(),
            sample_after: 100,
            sample_window_secs: 60,
            sample_every: 50,
        }
    }
}

/// How a signature pattern is compared against the normalized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Some `/`-separated segment equals the pattern.
    Segment,
    /// The pattern occurs anywhere in the path.
    Contains,
    /// The path starts with the pattern.
    Prefix,
    /// The path ends with the pattern.
    Suffix,
}

/// A single reconnaissance signature.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureConfig {
    /// Lowercase pattern.
    pub pattern: String,

    pub kind: MatchKind,

    /// Machine-readable reason tag logged on match.
    pub reason: String,
}

/// Path classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Start from the built-in signature set.
    pub include_defaults: bool,

    /// Extra signatures, checked after the defaults.
    pub signatures: Vec<SignatureConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            signatures: Vec::new(),
        }
    }
}

/// Reconnaissance tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Not-found responses within the window that trigger a ban.
    pub threshold: usize,

    /// Trailing window in seconds.
    pub window_secs: u64,

    /// Ban length in seconds.
    pub block_duration_secs: u64,

    /// Interval of the expiry sweeper in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            window_secs: 300,
            block_duration_secs: 900,
            sweep_interval_secs: 30,
        }
    }
}

/// Per-route rate limit override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteLimitConfig {
    /// Exact request path this bucket covers.
    pub path: String,

    /// Requests allowed per window.
    pub requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Global ceiling: requests per window per client.
    pub requests: u32,

    /// Global window length in seconds.
    pub window_secs: u64,

    /// Tighter per-route overrides.
    pub routes: Vec<RouteLimitConfig>,

    /// Paths that bypass the limiter. Must be named explicitly.
    pub exempt: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window_secs: 60,
            routes: vec![
                RouteLimitConfig {
                    path: "/login".to_string(),
                    requests: 5,
                    window_secs: 60,
                },
                RouteLimitConfig {
                    path: "/register".to_string(),
                    requests: 3,
                    window_secs: 3600,
                },
            ],
            exempt: vec![DEFAULT_WEBHOOK_PATH.to_string()],
        }
    }
}

/// Anti-forgery (double-submit token) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForgeryConfig {
    pub enabled: bool,

    /// Header carrying the submitted token.
    pub header_name: String,

    /// Cookie carrying the issued token.
    pub cookie_name: String,

    /// Paths exempt from the check.
    pub exempt: Vec<String>,
}

impl Default for ForgeryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "x-csrf-token".to_string(),
            cookie_name: "csrf_token".to_string(),
            exempt: vec![DEFAULT_WEBHOOK_PATH.to_string()],
        }
    }
}

pub const DEFAULT_WEBHOOK_PATH: &str = "/webhooks/payments";

/// Paths the server routes itself. Webhook paths may not reuse them.
pub const RESERVED_ROUTES: &[&str] = &["/health", "/robots.txt", "/favicon.ico", "/login", "/register"];

/// A secret value that never shows up in `Debug` output.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Payment-provider webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint paths.
    pub paths: Vec<String>,

    /// Header carrying the provider signature.
    pub signature_header: String,

    /// Signing secret. No default: absence fails closed.
    pub secret: Option<Secret>,

    /// Maximum age of a signed timestamp in seconds. 0 disables the check.
    pub tolerance_secs: u64,

    /// Maximum processed event ids remembered.
    pub idempotency_capacity: usize,

    /// Age after which a processed id is forgotten.
    pub idempotency_ttl_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            paths: vec![DEFAULT_WEBHOOK_PATH.to_string()],
            signature_header: "stripe-signature".to_string(),
            secret: None,
            tolerance_secs: 300,
            idempotency_capacity: 10_000,
            idempotency_ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: Secret,

    /// Admin API bind address.
    pub bind_address: String,
}

pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: Secret::new(ADMIN_KEY_PLACEHOLDER),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ShieldConfig {
    /// Paths that bypass the early rejection gate.
    pub fn gate_allowlist(&self) -> Vec<String> {
        let mut paths = self.gate.allowlist.clone();
        for path in &self.webhook.paths {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }
}
