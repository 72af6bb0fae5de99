//! Classifier hot reload.
//!
//! The config file is watched for edits. Each edit is reloaded and
//! validated, and only its `[classifier]` section is forwarded to the
//! running server. Edits to any other section are reported as needing a
//! restart and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{ClassifierConfig, ShieldConfig};

const LIVE_SECTION: &str = "classifier";

/// Watches one config file and emits classifier updates.
pub struct ConfigWatcher {
    path: PathBuf,
    running: ShieldConfig,
    update_tx: mpsc::UnboundedSender<ClassifierConfig>,
}

impl ConfigWatcher {
    /// `running` is the configuration the process started with; later edits
    /// are compared against it.
    pub fn new(
        path: &Path,
        running: ShieldConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ClassifierConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            running,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            running,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reload_classifier(&path, &running) {
                        Ok(classifier) => {
                            if update_tx.send(classifier).is_err() {
                                tracing::warn!("Classifier update dropped; server is no longer running");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Config reload rejected; keeping current signatures");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Reload `path` and return its classifier section, warning about any other
/// section that differs from `running`.
pub fn reload_classifier(
    path: &Path,
    running: &ShieldConfig,
) -> Result<ClassifierConfig, ConfigError> {
    let reloaded = load_config(path)?;
    let ignored = restart_only_changes(running, &reloaded);
    if !ignored.is_empty() {
        tracing::warn!(
            sections = ?ignored,
            "Config sections changed on disk but only take effect after a restart"
        );
    }
    Ok(reloaded.classifier)
}

/// Top-level sections, other than the classifier, that differ.
fn restart_only_changes(running: &ShieldConfig, reloaded: &ShieldConfig) -> Vec<String> {
    let (Ok(Value::Object(before)), Ok(Value::Object(after))) =
        (serde_json::to_value(running), serde_json::to_value(reloaded))
    else {
        return Vec::new();
    };
    after
        .iter()
        .filter(|(section, value)| {
            section.as_str() != LIVE_SECTION && before.get(section.as_str()) != Some(*value)
        })
        .map(|(section, _)| section.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MatchKind, SignatureConfig};

    fn extra_signature() -> SignatureConfig {
        SignatureConfig {
            pattern: "/old-admin".into(),
            kind: MatchKind::Prefix,
            reason: "scanner_target".into(),
        }
    }

    #[test]
    fn test_classifier_edit_is_not_a_restart_change() {
        let running = ShieldConfig::default();
        let mut edited = running.clone();
        edited.classifier.signatures.push(extra_signature());

        assert!(restart_only_changes(&running, &edited).is_empty());
    }

    #[test]
    fn test_other_sections_are_reported() {
        let running = ShieldConfig::default();
        let mut edited = running.clone();
        edited.recon.threshold = 7;
        edited.rate_limit.requests = 10;

        let mut changed = restart_only_changes(&running, &edited);
        changed.sort();
        assert_eq!(changed, vec!["rate_limit", "recon"]);
    }

    #[test]
    fn test_reload_returns_only_classifier() {
        let path = std::env::temp_dir().join(format!("shield-reload-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            [recon]
            threshold = 4

            [[classifier.signatures]]
            pattern = "/old-admin"
            kind = "prefix"
            reason = "scanner_target"
            "#,
        )
        .unwrap();

        let classifier = reload_classifier(&path, &ShieldConfig::default()).unwrap();
        assert_eq!(classifier.signatures.len(), 1);
        assert_eq!(classifier.signatures[0].pattern, "/old-admin");

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_invalid_edit_is_rejected() {
        let path = std::env::temp_dir().join(format!("shield-reload-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[recon]\nwindow_secs = 0\n").unwrap();

        let err = reload_classifier(&path, &ShieldConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
