//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + SHIELD_* environment
//!     → loader.rs (parse, deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → classifier signatures swapped atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - The webhook secret has no default; absence fails closed at request time
//! - Only the signature set hot-reloads; other settings need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ShieldConfig;
pub use schema::{
    AdminConfig, ClassifierConfig, ClientIpConfig, ForgeryConfig, GateConfig, ListenerConfig,
    MatchKind, ObservabilityConfig, RateLimitConfig, ReconConfig, RouteLimitConfig, Secret,
    SecurityConfig, SignatureConfig, TimeoutConfig, WebhookConfig, DEFAULT_WEBHOOK_PATH,
    RESERVED_ROUTES,
};
