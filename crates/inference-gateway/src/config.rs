//! Configuration types for the gateway

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, hosts, ports, timeouts};

/// Top-level gateway configuration
///
/// Loading this from disk is the host's job; the gateway only consumes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Local engine subprocess settings
    pub local: LocalEngineConfig,
    /// Per-provider overrides, keyed by engine name (e.g. "openai")
    pub providers: HashMap<String, ProviderOverride>,
}

impl GatewayConfig {
    /// Override for a provider, if one is configured
    pub fn provider(&self, name: &str) -> Option<&ProviderOverride> {
        self.providers.get(name)
    }
}

/// Settings for a remote provider that differ from its built-in profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    /// Replacement chat endpoint (useful for proxies and tests)
    pub base_url: Option<String>,
    /// Replacement embeddings endpoint
    pub embeddings_url: Option<String>,
}

/// Local engine subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEngineConfig {
    /// Host the engine binds to
    pub host: String,
    /// Port the engine listens on
    pub port: u16,
    /// Directory containing the engine binary and its libraries
    pub engine_dir: PathBuf,
    /// File name of the engine binary inside `engine_dir`
    pub binary_name: String,
    /// Runtime data directory handed to the engine
    pub data_dir: PathBuf,
    /// Value of the device-visibility variable (e.g. "0", "0,1")
    pub visible_devices: String,
    /// Interval between health polls
    pub health_interval_ms: u64,
    /// Bound on the health-check wait after spawn
    pub startup_timeout_secs: u64,
    /// How long `stop` waits for the process to exit after kill
    pub stop_timeout_ms: u64,
}

impl LocalEngineConfig {
    /// Base URL of the engine's HTTP server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL for a path on the engine's HTTP server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.engine_dir.join(&self.binary_name)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            host: hosts::LOCAL.to_string(),
            port: ports::LOCAL_ENGINE,
            engine_dir: PathBuf::from(defaults::ENGINE_DIR),
            binary_name: defaults::ENGINE_BINARY.to_string(),
            data_dir: PathBuf::from(defaults::DATA_DIR),
            visible_devices: defaults::VISIBLE_DEVICES.to_string(),
            health_interval_ms: timeouts::HEALTH_POLL_INTERVAL_MS,
            startup_timeout_secs: timeouts::ENGINE_STARTUP_SECS,
            stop_timeout_ms: timeouts::ENGINE_STOP_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_defaults() {
        let config = LocalEngineConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:3929");
        assert_eq!(config.url("/healthz"), "http://127.0.0.1:3929/healthz");
        assert_eq!(config.health_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let json = r#"{
            "local": { "port": 4000 },
            "providers": { "openai": { "base_url": "http://proxy/v1/chat/completions" } }
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.local.port, 4000);
        assert_eq!(config.local.host, "127.0.0.1");
        assert_eq!(
            config.provider("openai").and_then(|p| p.base_url.as_deref()),
            Some("http://proxy/v1/chat/completions")
        );
        assert!(config.provider("groq").is_none());
    }
}
