//! Request-defense and webhook-integrity pipeline for the scorebook web app.

pub mod admin;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod security;

pub use config::ShieldConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::Shield;
