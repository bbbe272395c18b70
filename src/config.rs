//! Configuration management for Bidgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::admission::AdmissionPolicy;
use crate::error::{BidgateError, Result};
use crate::notify::{SupersedePolicy, WriteFailurePolicy};

/// Prefix for environment overrides, e.g. `BIDGATE__ADMISSION__QUOTA=10`.
const ENV_PREFIX: &str = "BIDGATE";

/// Main configuration for the Bidgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BidgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Bid admission configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Live notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP and WebSocket listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8888))
}

/// Bid admission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Bid submissions allowed per contractor per window
    #[serde(default = "default_quota")]
    pub quota: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often stale windows are swept, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            quota: default_quota(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl AdmissionConfig {
    /// The policy the admission controller enforces.
    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.quota, Duration::from_secs(self.window_secs))
    }

    /// Interval between sweeps of stale windows.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_quota() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Live notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// What happens to a connection replaced by a newer one for the same user
    #[serde(default)]
    pub supersede: SupersedePolicy,

    /// Whether a failed write drops the connection from the registry
    #[serde(default)]
    pub on_write_failure: WriteFailurePolicy,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BidgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BidgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| BidgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply
    /// `BIDGATE__<SECTION>__<KEY>` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BidgateError::Config(e.to_string()))?;

        let config: BidgateConfig = settings
            .try_deserialize()
            .map_err(|e| BidgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the admission controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.admission.quota == 0 {
            return Err(BidgateError::Config(
                "admission.quota must be greater than 0".to_string(),
            ));
        }
        if self.admission.window_secs == 0 {
            return Err(BidgateError::Config(
                "admission.window_secs must be greater than 0".to_string(),
            ));
        }
        if self.admission.sweep_interval_secs == 0 {
            return Err(BidgateError::Config(
                "admission.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_yaml(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "bidgate-{}-{}.yaml",
            name,
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = BidgateConfig::default();
        assert_eq!(config.admission.quota, 5);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.admission.sweep_interval_secs, 60);
        assert_eq!(config.notify.supersede, SupersedePolicy::Retain);
        assert_eq!(config.notify.on_write_failure, WriteFailurePolicy::Ignore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
admission:
  quota: 10
notify:
  supersede: close
"#;
        let config: BidgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.admission.quota, 10);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.notify.supersede, SupersedePolicy::Close);
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let mut config = BidgateConfig::default();
        config.admission.quota = 0;
        assert!(matches!(config.validate(), Err(BidgateError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let path = write_temp_yaml(
            "from-file",
            "server:\n  http_addr: \"0.0.0.0:9000\"\nlogging:\n  json: true\n",
        );
        let config = BidgateConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert!(config.logging.json);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_layers_file() {
        let path = write_temp_yaml(
            "layered",
            "admission:\n  window_secs: 30\nnotify:\n  on_write_failure: disconnect\n",
        );
        let config = BidgateConfig::load(Some(&path)).unwrap();
        assert_eq!(config.admission.window_secs, 30);
        assert_eq!(config.admission.quota, 5);
        assert_eq!(config.notify.on_write_failure, WriteFailurePolicy::Disconnect);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(BidgateConfig::from_file("/nonexistent/bidgate.yaml").is_err());
    }
}
