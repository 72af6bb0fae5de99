//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{Secret, ShieldConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub const ENV_WEBHOOK_SECRET: &str = "SHIELD_WEBHOOK_SECRET";
pub const ENV_BIND_ADDRESS: &str = "SHIELD_BIND_ADDRESS";
pub const ENV_ADMIN_API_KEY: &str = "SHIELD_ADMIN_API_KEY";
pub const ENV_RECON_THRESHOLD: &str = "SHIELD_RECON_THRESHOLD";
pub const ENV_RECON_WINDOW_SECS: &str = "SHIELD_RECON_WINDOW_SECS";
pub const ENV_BLOCK_DURATION_SECS: &str = "SHIELD_BLOCK_DURATION_SECS";
pub const ENV_RATE_LIMIT: &str = "SHIELD_RATE_LIMIT";
pub const ENV_RATE_WINDOW_SECS: &str = "SHIELD_RATE_WINDOW_SECS";
pub const ENV_TRUSTED_PROXIES: &str = "SHIELD_TRUSTED_PROXIES";

/// Load and validate configuration from a TOML file, then apply process
/// environment overrides.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ShieldConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<ShieldConfig, ConfigError> {
    let mut config = ShieldConfig::default();
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment-style settings onto `config`.
///
/// `lookup` abstracts the environment so tests do not mutate process state.
pub fn apply_env_overrides<F>(config: &mut ShieldConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(ENV_WEBHOOK_SECRET) {
        // An empty variable stays "unconfigured" so the webhook fails closed.
        config.webhook.secret = if secret.trim().is_empty() {
            None
        } else {
            Some(Secret::new(secret))
        };
    }
    if let Some(addr) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    if let Some(proxies) = lookup(ENV_TRUSTED_PROXIES) {
        config.client_ip.trusted_proxies = proxies
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(key) = lookup(ENV_ADMIN_API_KEY) {
        config.admin.api_key = Secret::new(key);
    }
    if let Some(v) = parse_var(&lookup, ENV_RECON_THRESHOLD)? {
        config.recon.threshold = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_RECON_WINDOW_SECS)? {
        config.recon.window_secs = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_BLOCK_DURATION_SECS)? {
        config.recon.block_duration_secs = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_RATE_LIMIT)? {
        config.rate_limit.requests = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_RATE_WINDOW_SECS)? {
        config.rate_limit.window_secs = v;
    }
    Ok(())
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_trusted_proxies_from_env() {
        let mut config = ShieldConfig::default();
        apply_env_overrides(&mut config, env(&[(ENV_TRUSTED_PROXIES, "10.0.0.0/8, 192.0.2.1,")]))
            .unwrap();
        assert_eq!(config.client_ip.trusted_proxies, vec!["10.0.0.0/8", "192.0.2.1"]);
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut config = ShieldConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_WEBHOOK_SECRET, "whsec_test"),
                (ENV_RECON_THRESHOLD, "7"),
                (ENV_BLOCK_DURATION_SECS, "60"),
                (ENV_RATE_LIMIT, "10"),
            ]),
        )
        .unwrap();

        assert_eq!(config.webhook.secret.unwrap().expose(), "whsec_test");
        assert_eq!(config.recon.threshold, 7);
        assert_eq!(config.recon.block_duration_secs, 60);
        assert_eq!(config.rate_limit.requests, 10);
    }

    #[test]
    fn test_empty_secret_stays_unconfigured() {
        let mut config = ShieldConfig::default();
        apply_env_overrides(&mut config, env(&[(ENV_WEBHOOK_SECRET, "   ")])).unwrap();
        assert!(config.webhook.secret.is_none());
    }

    #[test]
    fn test_bad_number_reported() {
        let mut config = ShieldConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(ENV_RECON_WINDOW_SECS, "five")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_RECON_WINDOW_SECS, .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("shield-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [recon]
            threshold = 3
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.recon.threshold, 3);

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let path = std::env::temp_dir().join(format!("shield-invalid-{}.toml", std::process::id()));
        std::fs::write(&path, "[recon]\nthreshold = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
