//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default autosave interval (two minutes).
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 120;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Autosave settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Whether new sessions start autosaving once ready.
    pub enabled: bool,
    /// Configured (and minimum) interval in seconds.
    pub interval_secs: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

impl AutosaveConfig {
    /// Configured interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Autosave settings.
    pub autosave: AutosaveConfig,
}

impl SessionConfig {
    /// Parse and validate a JSON configuration. Missing fields use defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the values are invalid.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns error if the autosave interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "autosave.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(r#"{"autosave": {"enabled": false}}"#).unwrap();
        assert!(!config.autosave.enabled);
        assert_eq!(config.autosave.interval_secs, DEFAULT_AUTOSAVE_INTERVAL_SECS);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = SessionConfig::from_json(r#"{"autosave": {"interval_secs": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            SessionConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
