//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config (already loaded) → metrics → watcher → signals → listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → listeners drain, sweeper stops → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal
//! - Shutdown has a deadline: background tasks get 10s to drain

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
