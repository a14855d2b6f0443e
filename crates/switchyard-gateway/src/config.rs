//! Gateway configuration
//!
//! Defaults, then an optional YAML file, then environment variables:
//!
//! ```yaml
//! port: 8787
//! request_timeout_secs: 120
//! max_body_bytes: 10485760
//! shutdown_grace_ms: 2000
//! fallback_enabled: true
//! ```
//!
//! - `SWITCHYARD_PORT`
//! - `SWITCHYARD_REQUEST_TIMEOUT_SECS`
//! - `SWITCHYARD_MAX_BODY_BYTES`

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::GatewayError;

/// The gateway only ever listens on loopback.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 0 lets the OS pick a free port.
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub shutdown_grace_ms: u64,
    /// Retry failed proxied calls against the native provider.
    pub fallback_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 0,
            request_timeout_secs: 120,
            max_body_bytes: 10 * 1024 * 1024,
            shutdown_grace_ms: 2000,
            fallback_enabled: false,
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, GatewayError> {
        serde_yaml_ng::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, GatewayError> {
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|name| std::env::var(name).ok()))
    }

    /// Apply `SWITCHYARD_*` overrides. Unparseable values are ignored.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = env("SWITCHYARD_PORT").and_then(|v| v.trim().parse().ok()) {
            self.port = port;
        }
        if let Some(secs) = env("SWITCHYARD_REQUEST_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(bytes) = env("SWITCHYARD_MAX_BODY_BYTES").and_then(|v| v.trim().parse().ok()) {
            self.max_body_bytes = bytes;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 0);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_body_bytes, 10_485_760);
        assert!(!config.fallback_enabled);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GatewayConfig::from_yaml_str("port: 8787\nfallback_enabled: true\n").unwrap();
        assert_eq!(config.port, 8787);
        assert!(config.fallback_enabled);
        assert_eq!(config.shutdown_grace_ms, 2000);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = GatewayConfig::from_yaml_str("port: 8787").unwrap().with_env(|name| match name {
            "SWITCHYARD_PORT" => Some("9000".into()),
            "SWITCHYARD_MAX_BODY_BYTES" => Some("oops".into()),
            _ => None,
        });
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        assert!(matches!(
            GatewayConfig::from_yaml_str("port: [not a port"),
            Err(GatewayError::Config(_))
        ));
    }
}
