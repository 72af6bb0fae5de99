//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum Router: allowlisted endpoints, webhook route(s),
//!   application routes, uniform 404 fallback
//! - Wire the defense pipeline and the tower-http stack in a fixed order
//! - Run the expiry sweeper and classifier hot reload next to the listener
//! - Serve with connect info and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::{header, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ClassifierConfig, Secret, ShieldConfig, RESERVED_ROUTES};
use crate::http::request::{request_span, UuidRequestId};
use crate::payments::{webhook_handler, EventHandler, SubscriptionUpdater, WebhookService};
use crate::security::forgery::forgery_middleware;
use crate::security::gate::gate_middleware;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::recon::recon_middleware;
use crate::security::response::{is_api_path, rejection};
use crate::security::sweeper::run_sweeper;
use crate::security::{Rejection, Shield};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub shield: Arc<Shield>,
    pub webhooks: Arc<WebhookService>,
    pub admin_key: Secret,
    pub started_at: Instant,
}

impl FromRef<AppState> for Arc<Shield> {
    fn from_ref(state: &AppState) -> Self {
        state.shield.clone()
    }
}

impl FromRef<AppState> for Arc<WebhookService> {
    fn from_ref(state: &AppState) -> Self {
        state.webhooks.clone()
    }
}

/// HTTP server for the defended application.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ShieldConfig,
}

impl HttpServer {
    /// Production wiring with the default subscription updater and placeholder
    /// authentication routes.
    pub fn new(config: ShieldConfig) -> Self {
        let shield = Arc::new(Shield::new(&config));
        Self::from_parts(config, shield, Arc::new(SubscriptionUpdater::new()), default_app_routes())
    }

    /// Assemble from prebuilt parts. `app` carries the application's own
    /// routes; it must not set a fallback.
    pub fn from_parts(
        config: ShieldConfig,
        shield: Arc<Shield>,
        handler: Arc<dyn EventHandler>,
        app: Router,
    ) -> Self {
        let webhooks = Arc::new(WebhookService::new(
            &config.webhook,
            shield.clock().clone(),
            handler,
        ));
        let state = AppState {
            shield,
            webhooks,
            admin_key: config.admin.api_key.clone(),
            started_at: Instant::now(),
        };
        let router = Self::build_router(&config, state.clone(), app);
        Self { router, state, config }
    }

    /// Layers run outermost first: request id, trace, timeout, body limit,
    /// reconnaissance tracking, early rejection, rate limit, forgery guard.
    #[allow(deprecated)]
    fn build_router(config: &ShieldConfig, state: AppState, app: Router) -> Router {
        let shield = state.shield.clone();

        let mut routes: Router<AppState> = Router::new()
            .route("/health", get(health))
            .route("/robots.txt", get(robots))
            .route("/favicon.ico", get(favicon));
        let mut mounted: Vec<&str> = Vec::new();
        for path in &config.webhook.paths {
            // Validation rejects these; an unvalidated config must still not panic the router.
            if RESERVED_ROUTES.contains(&path.as_str()) || mounted.contains(&path.as_str()) {
                tracing::error!(path = %path, "Webhook path already routed; skipping");
                continue;
            }
            routes = routes.route(path, post(webhook_handler));
            mounted.push(path.as_str());
        }

        routes
            .fallback(not_found)
            .with_state(state)
            .merge(app)
            .layer(middleware::from_fn_with_state(shield.clone(), forgery_middleware))
            .layer(middleware::from_fn_with_state(shield.clone(), rate_limit_middleware))
            .layer(middleware::from_fn_with_state(shield.clone(), gate_middleware))
            .layer(middleware::from_fn_with_state(shield, recon_middleware))
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The assembled router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Serve until `shutdown` fires. Spawns the expiry sweeper and applies
    /// classifier updates from `classifier_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut classifier_updates: mpsc::UnboundedReceiver<ClassifierConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            webhook_configured = self.state.webhooks.is_configured(),
            signatures = self.state.shield.gate().signature_count(),
            "HTTP server starting"
        );

        tokio::spawn(run_sweeper(
            self.state.shield.clone(),
            Duration::from_secs(self.config.recon.sweep_interval_secs.max(1)),
            shutdown.resubscribe(),
        ));

        let shield = self.state.shield.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = classifier_updates.recv() => match update {
                        Some(classifier) => shield.reload_classifier(&classifier),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Stand-ins for the authentication subsystem's routes, present so the rate
/// limiter's per-route rules have something to guard.
pub fn default_app_routes() -> Router {
    Router::new()
        .route("/login", get(auth_placeholder).post(auth_placeholder))
        .route("/register", get(auth_placeholder).post(auth_placeholder))
}

async fn auth_placeholder() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn robots() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "User-agent: *\nDisallow: /api/\n",
    )
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found(State(shield): State<Arc<Shield>>, uri: Uri) -> Response {
    rejection(Rejection::NotFound, is_api_path(uri.path(), shield.api_prefix()))
}
