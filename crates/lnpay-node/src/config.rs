//! Node configuration loading and management.

use lnpay_core::{EngineConfig, FeeReserveConfig};
use lnpay_settlement::adapters::LndConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full configuration for the lnpay node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LnpayConfig {
    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fee reserve applied when authorizing payments.
    #[serde(default)]
    pub fee_reserve: FeeReserveConfig,

    /// Settlement engine timeouts and reconciliation cadence.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Lightning backend selection.
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Which Lightning network the node pays through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process network; nothing leaves the node.
    #[default]
    Internal,
    /// An LND node over its REST interface.
    Lnd,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Internal => write!(f, "internal"),
            Backend::Lnd => write!(f, "lnd"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Identity pubkey of the local node. Payments to it reserve no fee.
    /// With the lnd backend it is fetched from the node when unset.
    #[serde(default)]
    pub identity_pubkey: Option<String>,
    /// Required when `backend = "lnd"`.
    #[serde(default)]
    pub lnd: Option<LndConfig>,
}

// Default value functions
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    3000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Internal,
            identity_pubkey: None,
            lnd: None,
        }
    }
}

impl LnpayConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: LnpayConfig = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject combinations the node cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.backend == Backend::Lnd && self.network.lnd.is_none() {
            anyhow::bail!("network.backend = \"lnd\" requires a [network.lnd] section");
        }
        if self.engine.execution_timeout_ms == 0 {
            anyhow::bail!("engine.execution_timeout_ms must be positive");
        }
        if self.engine.reconcile_interval_secs == 0 {
            anyhow::bail!("engine.reconcile_interval_secs must be positive");
        }
        Ok(())
    }

    /// Socket address string the HTTP API binds to.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }
}
