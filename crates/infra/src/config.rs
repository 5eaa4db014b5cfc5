//! Runtime configuration read from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const BIND_ADDR_VAR: &str = "STOCKLEDGER_BIND_ADDR";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const LOCK_TIMEOUT_VAR: &str = "STOCKLEDGER_LOCK_TIMEOUT_MS";
pub const RETRY_ATTEMPTS_VAR: &str = "STOCKLEDGER_RETRY_ATTEMPTS";
pub const LOG_FORMAT_VAR: &str = "STOCKLEDGER_LOG_FORMAT";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; in-memory storage when unset.
    pub database_url: Option<String>,
    pub lock_timeout: Duration,
    /// Attempts per operation, first try included. Always at least 1.
    pub retry_attempts: u32,
    pub log_json: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            lock_timeout: Duration::from_millis(2000),
            retry_attempts: 3,
            log_json: true,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get(BIND_ADDR_VAR) {
            config.bind_addr = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(BIND_ADDR_VAR, &value, e))?;
        }

        config.database_url = get(DATABASE_URL_VAR);

        if let Some(value) = get(LOCK_TIMEOUT_VAR) {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(LOCK_TIMEOUT_VAR, &value, e))?;
            config.lock_timeout = Duration::from_millis(ms);
        }

        if let Some(value) = get(RETRY_ATTEMPTS_VAR) {
            let attempts: u32 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(RETRY_ATTEMPTS_VAR, &value, e))?;
            if attempts == 0 {
                return Err(ConfigError::invalid(
                    RETRY_ATTEMPTS_VAR,
                    &value,
                    "must be at least 1",
                ));
            }
            config.retry_attempts = attempts;
        }

        if let Some(value) = get(LOG_FORMAT_VAR) {
            config.log_json = match value.trim().to_ascii_lowercase().as_str() {
                "json" => true,
                "pretty" => false,
                _ => {
                    return Err(ConfigError::invalid(
                        LOG_FORMAT_VAR,
                        &value,
                        "expected 'json' or 'pretty'",
                    ));
                }
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            (BIND_ADDR_VAR, "127.0.0.1:9000"),
            (DATABASE_URL_VAR, "postgres://ledger@localhost/ledger"),
            (LOCK_TIMEOUT_VAR, "250"),
            (RETRY_ATTEMPTS_VAR, "5"),
            (LOG_FORMAT_VAR, "Pretty"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://ledger@localhost/ledger")
        );
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_attempts, 5);
        assert!(!config.log_json);
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = load(&[(DATABASE_URL_VAR, "  "), (RETRY_ATTEMPTS_VAR, "")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (var, value) in [
            (BIND_ADDR_VAR, "not-an-addr"),
            (LOCK_TIMEOUT_VAR, "-1"),
            (RETRY_ATTEMPTS_VAR, "0"),
            (LOG_FORMAT_VAR, "xml"),
        ] {
            let err = load(&[(var, value)]).unwrap_err();
            let ConfigError::Invalid { var: reported, .. } = err;
            assert_eq!(reported, var);
        }
    }
}
