//! Sync configuration with layered sources.
//!
//! Loading flow:
//! 1. Compiled [`SyncConfig::default()`]
//! 2. Optional JSON file (missing keys keep their defaults)
//! 3. `TALLY_*` environment variables (highest priority)
//!
//! Env values that fail to parse or fall outside their range are ignored.
//! The merged result is validated before it is returned.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Period of the background reconciliation.
    pub reconcile_interval_ms: u64,
    /// Settle delay before a refresh entry refetches.
    pub refresh_delay_ms: u64,
    /// How long a conflict marker stays visible.
    pub conflict_clear_delay_ms: u64,
    /// Upper bound for any single backend call.
    pub request_timeout_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_retries: u32,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 60_000,
            refresh_delay_ms: 500,
            conflict_clear_delay_ms: 3_000,
            request_timeout_ms: 10_000,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 10_000,
            max_retries: 5,
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load from an optional file, then apply process env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!(?path, "loading sync config from file");
                let content = std::fs::read_to_string(path)?;
                Self::from_json(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `TALLY_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read_u64 = |key: &str, min: u64, max: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| (min..=max).contains(v))
        };

        if let Some(v) = read_u64("TALLY_RECONCILE_INTERVAL_MS", 1_000, 86_400_000) {
            self.reconcile_interval_ms = v;
        }
        if let Some(v) = read_u64("TALLY_REFRESH_DELAY_MS", 0, 60_000) {
            self.refresh_delay_ms = v;
        }
        if let Some(v) = read_u64("TALLY_CONFLICT_CLEAR_DELAY_MS", 0, 600_000) {
            self.conflict_clear_delay_ms = v;
        }
        if let Some(v) = read_u64("TALLY_REQUEST_TIMEOUT_MS", 100, 600_000) {
            self.request_timeout_ms = v;
        }
        if let Some(v) = read_u64("TALLY_RETRY_BASE_DELAY_MS", 0, 600_000) {
            self.retry_base_delay_ms = v;
        }
        if let Some(v) = read_u64("TALLY_RETRY_MAX_DELAY_MS", 0, 3_600_000) {
            self.retry_max_delay_ms = v;
        }
        if let Some(v) = read_u64("TALLY_MAX_RETRIES", 1, 100) {
            self.max_retries = v as u32;
        }
        if let Some(v) = lookup("TALLY_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "reconcileIntervalMs must be greater than 0".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "requestTimeoutMs must be greater than 0".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "maxRetries must be at least 1".into(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::InvalidValue(format!(
                "retryMaxDelayMs ({}) is below retryBaseDelayMs ({})",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn conflict_clear_delay(&self) -> Duration {
        Duration::from_millis(self.conflict_clear_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: 2.0,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_timings() {
        let config = SyncConfig::default();
        assert_eq!(config.reconcile_interval(), Duration::from_secs(60));
        assert_eq!(config.refresh_delay(), Duration::from_millis(500));
        assert_eq!(config.conflict_clear_delay(), Duration::from_secs(3));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = SyncConfig::from_json(r#"{ "reconcileIntervalMs": 5000, "maxRetries": 3 }"#)
            .unwrap();
        assert_eq!(config.reconcile_interval_ms, 5_000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.refresh_delay_ms, 500);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = SyncConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TALLY_RECONCILE_INTERVAL_MS", "15000"),
            ("TALLY_MAX_RETRIES", "not-a-number"),
            ("TALLY_REQUEST_TIMEOUT_MS", "5"),
            ("TALLY_LOG_LEVEL", "debug"),
        ]);
        let mut config = SyncConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.reconcile_interval_ms, 15_000);
        assert_eq!(config.max_retries, 5);
        // Below the accepted range.
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn validation_rejects_zero_retries_and_inverted_delays() {
        let config = SyncConfig {
            max_retries: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = SyncConfig {
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 1_000,
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retryMaxDelayMs"));
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = SyncConfig::load(None).unwrap();
        assert!(config.max_retries >= 1);
    }
}
