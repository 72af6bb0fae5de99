//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (TLS terminated upstream)
//!     → request.rs (request id, trace span)
//!     → server.rs (tower-http stack, defense pipeline, routes)
//!     → handler or uniform rejection
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{default_app_routes, AppState, HttpServer};
