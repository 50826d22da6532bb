//! Configuration management for Ratewarden.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RatewardenError, Result};
use crate::ratelimit::LimitRule;

/// Main configuration for the Ratewarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatewardenConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Largest JSON body buffered to look for a user id
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_body_limit() -> usize {
    100 * 1024
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Rule given to keys seen for the first time
    #[serde(default)]
    pub default_rule: LimitRule,

    /// Seconds between two expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Per-key rules given to those keys when their entry is created
    #[serde(default)]
    pub overrides: BTreeMap<String, LimitRule>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default_rule: LimitRule::default(),
            sweep_interval_secs: default_sweep_interval(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Time between two expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl RatewardenConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RatewardenConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatewardenError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot enforce on its own.
    ///
    /// Rules are validated while deserialising, so only the remaining
    /// numeric settings are checked here.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(RatewardenError::Config(
                "sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(RatewardenError::Config(
                "body_limit_bytes must be greater than 0".to_string(),
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
        let config = RatewardenConfig::default();
        assert_eq!(config.server.http_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.server.body_limit_bytes, 102_400);
        assert_eq!(config.rate_limiting.default_rule, LimitRule::new(10, 60_000).unwrap());
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(60));
        assert!(config.rate_limiting.overrides.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = RatewardenConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.http_addr.port(), 3000);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  http_addr: 127.0.0.1:8080
  body_limit_bytes: 4096
rate_limiting:
  default_rule:
    limit: 100
    window_ms: 1000
  sweep_interval_secs: 30
  overrides:
    "user:premium":
      limit: 1000
      window_ms: 1000
    "ip:10.0.0.1":
      limit: 5
      windowMs: 60000
"#;
        let config = RatewardenConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.body_limit_bytes, 4096);
        assert_eq!(config.rate_limiting.default_rule, LimitRule::new(100, 1000).unwrap());
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(30));
        assert_eq!(
            config.rate_limiting.overrides["user:premium"],
            LimitRule::new(1000, 1000).unwrap()
        );
        assert_eq!(
            config.rate_limiting.overrides["ip:10.0.0.1"],
            LimitRule::new(5, 60_000).unwrap()
        );
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let yaml = r#"
rate_limiting:
  default_rule:
    limit: 0
    window_ms: 1000
"#;
        let err = RatewardenConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RatewardenError::Config(_)));
        assert!(err.to_string().contains("Limit must be greater than 0"));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let yaml = r#"
rate_limiting:
  sweep_interval_secs: 0
"#;
        assert!(RatewardenConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bundled_example_config() {
        let config = RatewardenConfig::from_yaml(include_str!("../config/ratewarden.yaml")).unwrap();
        assert_eq!(config.server.http_addr.port(), 3000);
        assert_eq!(config.rate_limiting.default_rule, LimitRule::default());
        assert_eq!(config.rate_limiting.overrides.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = RatewardenConfig::from_file("/nonexistent/ratewarden.yaml").unwrap_err();
        assert!(matches!(err, RatewardenError::Io(_)));
    }
}
