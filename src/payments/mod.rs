//! Payment-provider webhook ingestion.
//!
//! # Data Flow
//! ```text
//! POST /webhooks/payments (raw bytes)
//!     → signature.rs (HMAC over "<t>." ++ body; fail closed without a secret)
//!     → idempotency.rs (first delivery wins; duplicates short-circuit)
//!     → processor.rs (EventHandler applies the effect)
//!     → handler.rs (outcome → 200 / 400 / 500)
//! ```

pub mod handler;
pub mod idempotency;
pub mod processor;
pub mod signature;
pub mod types;

pub use handler::{webhook_handler, WebhookOutcome, WebhookService};
pub use idempotency::IdempotencyCache;
pub use processor::{EffectError, EventHandler, SubscriptionInfo, SubscriptionStatus, SubscriptionUpdater};
pub use signature::{WebhookError, WebhookVerifier};
pub use types::Event;
