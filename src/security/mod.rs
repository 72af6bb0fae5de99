//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → recon.rs (resolve client; after the response, count 404s)
//!     → gate.rs (allowlist, banned clients, path signatures, dotfiles)
//!     → rate_limit.rs (per client/route fixed window, exemption registry)
//!     → forgery.rs (anti-forgery token on unsafe methods)
//!     → Pass to routing
//!
//! Background:
//!     sweeper.rs (single task: expire bans, prune idle state)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Every rejection renders through response.rs, identical across rules
//! - All shared state lives in one Shield object, never in globals
//! - The webhook path is allowlisted, rate-limit exempt and forgery exempt;
//!   its signature check is the stronger substitute

pub mod classifier;
pub mod client;
pub mod forgery;
pub mod gate;
pub mod rate_limit;
pub mod recon;
pub mod registry;
pub mod response;
pub mod shield;
pub mod sweeper;

pub use classifier::{PathClassifier, Verdict};
pub use client::{AuthenticatedUser, ClientId, IdentityProvider};
pub use gate::GateDecision;
pub use rate_limit::Decision;
pub use recon::ReconOutcome;
pub use registry::{BlockEntry, BlockRegistry};
pub use response::Rejection;
pub use shield::{Shield, SweepReport};
