//! Fixed-window rate limiting with an explicit exemption registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::client::AuthenticatedUser;
use crate::security::response::{is_api_path, rejection, Rejection};
use crate::security::shield::Shield;

pub const GLOBAL_BUCKET: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Limit {
    requests: u32,
    window_secs: u64,
}

/// Counter for one (key, bucket) pair.
#[derive(Debug)]
struct FixedWindow {
    started_at: u64,
    count: u32,
    window_secs: u64,
}

impl FixedWindow {
    fn try_acquire(&mut self, now: u64, limit: Limit) -> bool {
        let window_start = now - now % limit.window_secs;
        if self.started_at != window_start {
            self.started_at = window_start;
            self.count = 0;
        }
        self.window_secs = limit.window_secs;

        // Denied attempts are not counted.
        if self.count >= limit.requests {
            return false;
        }
        self.count += 1;
        true
    }

    fn is_stale(&self, now: u64) -> bool {
        now >= self.started_at.saturating_add(self.window_secs)
    }
}

/// Which policy a path falls under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bucket {
    /// Listed in the exemption registry.
    Exempt,
    /// A route-specific override.
    Route(String),
    /// The default ceiling.
    Global,
}

impl Bucket {
    pub fn name(&self) -> &str {
        match self {
            Bucket::Exempt => "exempt",
            Bucket::Route(path) => path.as_str(),
            Bucket::Global => GLOBAL_BUCKET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    /// Bypassed through the exemption registry; no counter touched.
    Exempt,
}

pub struct RateLimiter {
    enabled: bool,
    default: Limit,
    routes: HashMap<String, Limit>,
    exempt: HashSet<String>,
    counters: Mutex<HashMap<(String, String), FixedWindow>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|r| {
                (
                    r.path.clone(),
                    Limit {
                        requests: r.requests,
                        window_secs: r.window_secs.max(1),
                    },
                )
            })
            .collect();

        Self {
            enabled: config.enabled,
            default: Limit {
                requests: config.requests,
                window_secs: config.window_secs.max(1),
            },
            routes,
            exempt: config.exempt.iter().cloned().collect(),
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn bucket_for(&self, path: &str) -> Bucket {
        if self.exempt.contains(path) {
            Bucket::Exempt
        } else if self.routes.contains_key(path) {
            Bucket::Route(path.to_string())
        } else {
            Bucket::Global
        }
    }

    /// Count one request from `key` to `path`.
    pub fn check(&self, key: &str, path: &str) -> Decision {
        let bucket = self.bucket_for(path);
        if !self.enabled || bucket == Bucket::Exempt {
            return Decision::Exempt;
        }
        let limit = match &bucket {
            Bucket::Route(route) => self.routes.get(route).copied().unwrap_or(self.default),
            _ => self.default,
        };

        let now = self.clock.now_unix_sec();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let window = counters
            .entry((key.to_string(), bucket.name().to_string()))
            .or_insert_with(|| FixedWindow {
                started_at: now - now % limit.window_secs,
                count: 0,
                window_secs: limit.window_secs,
            });

        if window.try_acquire(now, limit) {
            Decision::Allowed
        } else {
            Decision::Denied
        }
    }

    /// Remove counters whose window has closed. Returns how many.
    pub fn prune(&self) -> usize {
        let now = self.clock.now_unix_sec();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let before = counters.len();
        counters.retain(|_, window| !window.is_stale(now));
        before - counters.len()
    }

    /// Number of live (key, bucket) counters.
    pub fn tracked_keys(&self) -> usize {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.contains(path)
    }
}

/// Middleware enforcing the limiter. Authenticated requests are keyed by
/// identity, anonymous ones by client address.
pub async fn rate_limit_middleware(
    State(shield): State<Arc<Shield>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let key = match request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .or_else(|| shield.identity().identify(request.headers()))
    {
        Some(AuthenticatedUser(user)) => format!("user:{user}"),
        None => format!("ip:{}", shield.resolver().resolve(&request)),
    };

    match shield.limiter().check(&key, &path) {
        Decision::Allowed | Decision::Exempt => next.run(request).await,
        Decision::Denied => {
            let bucket = shield.limiter().bucket_for(&path);
            metrics::record_rate_limited(bucket.name());
            rejection(Rejection::TooManyRequests, is_api_path(&path, shield.api_prefix()))
        }
    }
}
