//! The request-defense service object.
//!
//! [`Shield`] owns every piece of shared per-client state (ban registry,
//! reconnaissance windows, rate-limit counters) plus the policies that read
//! it. One instance is built at startup, wrapped in `Arc`, and handed to each
//! middleware as axum state. Tests build their own with a manual clock.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{ClassifierConfig, ShieldConfig};
use crate::observability::metrics;
use crate::observability::{LogSampler, SecurityEventSink, TracingSink};
use crate::security::classifier::PathClassifier;
use crate::security::client::{Anonymous, ClientResolver, IdentityProvider};
use crate::security::forgery::ForgeryGuard;
use crate::security::gate::EarlyRejectionGate;
use crate::security::rate_limit::RateLimiter;
use crate::security::recon::ReconTracker;
use crate::security::registry::BlockRegistry;

/// What one sweep released.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub bans_released: usize,
    pub idle_clients: usize,
    pub rate_windows: usize,
}

pub struct Shield {
    clock: Arc<dyn Clock>,
    registry: Arc<BlockRegistry>,
    gate: EarlyRejectionGate,
    recon: ReconTracker,
    limiter: RateLimiter,
    forgery: ForgeryGuard,
    resolver: ClientResolver,
    identity: Arc<dyn IdentityProvider>,
    sampler: LogSampler,
    sink: Arc<dyn SecurityEventSink>,
    api_prefix: String,
}

impl Shield {
    /// Production wiring: wall clock, tracing sink, no identity provider.
    pub fn new(config: &ShieldConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: &ShieldConfig) -> ShieldBuilder<'_> {
        ShieldBuilder {
            config,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            identity: Arc::new(Anonymous),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &EarlyRejectionGate {
        &self.gate
    }

    pub fn recon(&self) -> &ReconTracker {
        &self.recon
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn forgery(&self) -> &ForgeryGuard {
        &self.forgery
    }

    pub fn resolver(&self) -> &ClientResolver {
        &self.resolver
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub fn sampler(&self) -> &LogSampler {
        &self.sampler
    }

    pub fn sink(&self) -> &dyn SecurityEventSink {
        self.sink.as_ref()
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Recompile and swap the signature set. Other settings need a restart.
    pub fn reload_classifier(&self, config: &ClassifierConfig) {
        let classifier = PathClassifier::from_config(config);
        let count = classifier.len();
        self.gate.replace_classifier(classifier);
        tracing::info!(signatures = count, "Path classifier reloaded");
    }

    /// Release expired bans and drop idle per-client state.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            bans_released: self.registry.sweep(),
            idle_clients: self.recon.prune_idle(),
            rate_windows: self.limiter.prune(),
        };
        metrics::record_active_blocks(self.registry.len());
        report
    }
}

pub struct ShieldBuilder<'a> {
    config: &'a ShieldConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SecurityEventSink>,
    identity: Arc<dyn IdentityProvider>,
}

impl ShieldBuilder<'_> {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn SecurityEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn build(self) -> Shield {
        let config = self.config;
        let registry = Arc::new(BlockRegistry::new(self.clock.clone()));

        Shield {
            gate: EarlyRejectionGate::new(config, registry.clone()),
            recon: ReconTracker::new(
                &config.recon,
                registry.clone(),
                self.clock.clone(),
                self.sink.clone(),
            ),
            limiter: RateLimiter::new(&config.rate_limit, self.clock.clone()),
            forgery: ForgeryGuard::from_config(&config.forgery),
            resolver: ClientResolver::from_config(&config.client_ip),
            identity: self.identity,
            sampler: LogSampler::new(
                config.gate.sample_after,
                config.gate.sample_window_secs,
                config.gate.sample_every,
            ),
            sink: self.sink,
            api_prefix: config.gate.api_prefix.clone(),
            registry,
            clock: self.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_sweep_reports_every_store() {
        let clock = Arc::new(ManualClock::new(6_000));
        let mut config = ShieldConfig::default();
        config.recon.threshold = 2;
        config.recon.block_duration_secs = 100;
        let shield = Shield::builder(&config).clock(clock.clone()).build();

        shield.recon().record_not_found("scanner", "/a", None);
        shield.recon().record_not_found("scanner", "/b", None);
        shield.recon().record_not_found("idle", "/a", None);
        shield.limiter().check("ip:idle", "/");
        assert!(shield.registry().is_blocked("scanner"));

        clock.advance(400);
        let report = shield.sweep();
        assert_eq!(
            report,
            SweepReport {
                bans_released: 1,
                idle_clients: 1,
                rate_windows: 1,
            }
        );
        assert!(!shield.registry().is_blocked("scanner"));
    }

    #[test]
    fn test_reload_classifier() {
        let shield = Shield::new(&ShieldConfig::default());
        let before = shield.gate().signature_count();

        let mut classifier = ClassifierConfig::default();
        classifier.signatures.push(crate::config::SignatureConfig {
            pattern: "/debug".into(),
            kind: crate::config::MatchKind::Prefix,
            reason: "scanner_target".into(),
        });
        shield.reload_classifier(&classifier);
        assert_eq!(shield.gate().signature_count(), before + 1);
    }
}
