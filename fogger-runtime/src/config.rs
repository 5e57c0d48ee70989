//! Monitor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MonitorError;

/// Domain monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Re-evaluation interval used when a domain is added without one
    pub default_interval_secs: u64,
    /// Timeout handed to signal sources for each scan
    pub scan_timeout_secs: u64,
    /// Change records kept per domain (oldest dropped first)
    pub max_change_log: usize,
    /// Buffered change notifications per subscriber
    pub change_channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 300,
            scan_timeout_secs: 10,
            max_change_log: 1000,
            change_channel_capacity: 64,
        }
    }
}

impl MonitorConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, MonitorError> {
        let config: Self =
            toml::from_str(text).map_err(|e| MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.default_interval_secs == 0 {
            return Err(MonitorError::Config(
                "default_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.change_channel_capacity == 0 {
            return Err(MonitorError::Config(
                "change_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.default_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MonitorConfig::from_toml_str("scan_timeout_secs = 30").unwrap();
        assert_eq!(config.scan_timeout_secs, 30);
        assert_eq!(config.max_change_log, 1000);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = MonitorConfig::from_toml_str("default_interval_secs = 0").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(MonitorConfig::from_toml_str("scan_timeout_secs = \"soon\"").is_err());
    }
}
