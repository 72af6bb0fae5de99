//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use futures_util::future::BoxFuture;
use tower::ServiceExt;

use scorebook_shield::clock::ManualClock;
use scorebook_shield::config::{Secret, ShieldConfig};
use scorebook_shield::http::{default_app_routes, HttpServer};
use scorebook_shield::observability::{SecurityEventRecord, SecurityEventSink, Severity};
use scorebook_shield::payments::signature::sign;
use scorebook_shield::payments::{EffectError, Event, EventHandler};
use scorebook_shield::security::Shield;

pub const SECRET: &str = "whsec_integration";
pub const NOW: u64 = 1_700_000_000;
pub const WEBHOOK: &str = "/webhooks/payments";

/// Records every security event instead of logging it.
#[derive(Default)]
pub struct CaptureSink {
    records: Mutex<Vec<(Severity, SecurityEventRecord)>>,
}

impl CaptureSink {
    pub fn count(&self, severity: Severity) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }

    pub fn records(&self) -> Vec<(Severity, SecurityEventRecord)> {
        self.records.lock().unwrap().clone()
    }
}

impl SecurityEventSink for CaptureSink {
    fn emit(&self, severity: Severity, record: &SecurityEventRecord) {
        self.records.lock().unwrap().push((severity, record.clone()));
    }
}

/// Effect handler that only counts calls.
#[derive(Default)]
pub struct SpyHandler {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl SpyHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl EventHandler for SpyHandler {
    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), EffectError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(event.id.clone());
        Box::pin(async { Ok(()) })
    }
}

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub shield: Arc<Shield>,
    pub spy: Arc<SpyHandler>,
    pub sink: Arc<CaptureSink>,
    pub server: HttpServer,
}

impl TestApp {
    /// Defaults plus a configured webhook secret.
    pub fn new() -> Self {
        let mut config = ShieldConfig::default();
        config.webhook.secret = Some(Secret::new(SECRET));
        Self::with_config(config)
    }

    pub fn with_config(config: ShieldConfig) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let sink = Arc::new(CaptureSink::default());
        let spy = Arc::new(SpyHandler::default());
        let shield = Arc::new(
            Shield::builder(&config)
                .clock(clock.clone())
                .sink(sink.clone())
                .build(),
        );
        let server = HttpServer::from_parts(config, shield.clone(), spy.clone(), default_app_routes());
        Self {
            router: server.router(),
            clock,
            shield,
            spy,
            sink,
            server,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str, client: &str) -> Response {
        self.send(request(Method::GET, path, client).body(Body::empty()).unwrap())
            .await
    }

    /// Deliver `body` to the webhook, signed with `SECRET` at the app clock's time.
    pub async fn deliver(&self, body: &str, client: &str) -> Response {
        let header = sign(SECRET, self.clock_now(), body.as_bytes()).unwrap();
        self.send(
            request(Method::POST, WEBHOOK, client)
                .header("stripe-signature", header)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub fn clock_now(&self) -> u64 {
        use scorebook_shield::clock::Clock;
        self.clock.now_unix_sec()
    }
}

/// Request builder with a peer address attached, as the listener would.
pub fn request(method: Method, path: &str, client: &str) -> axum::http::request::Builder {
    let peer: SocketAddr = format!("{client}:40000").parse().unwrap();
    Request::builder()
        .method(method)
        .uri(path)
        .extension(ConnectInfo(peer))
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn event_json(id: &str, event_type: &str) -> String {
    format!(
        r#"{{"id":"{id}","object":"event","type":"{event_type}","data":{{"object":{{"id":"sub_1","customer":"cus_1"}}}}}}"#
    )
}
