//! Startup orchestration.
//!
//! Order: metrics, config watcher, signal handling, listeners. Any bind
//! failure is fatal. The admin listener only starts when enabled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::serve_admin;
use crate::config::watcher::ConfigWatcher;
use crate::config::ShieldConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::metrics;

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Run the service until a termination signal arrives.
pub async fn run(config: ShieldConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the life of the process.
    let (_watcher, classifier_updates) = match config_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(&path, config.clone());
            match watcher.run() {
                Ok(handle) => (Some(handle), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable; hot reload disabled");
                    (None, rx)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let listener = bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config.clone());

    let mut background = Vec::new();
    if config.admin.enabled {
        let admin_listener = bind(&config.admin.bind_address).await?;
        let state = server.state().clone();
        let admin_shutdown = shutdown.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(e) = serve_admin(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let result = server.run(listener, classifier_updates, shutdown.subscribe()).await;
    // A listener failure must still stop the other tasks.
    shutdown.trigger("http server exited");
    drain(background, DRAIN_DEADLINE).await;

    result.map_err(StartupError::from)
}
