//! # Node Configuration
//!
//! The node reads one TOML file. Every table is optional; anything missing
//! falls back to its default, so the file `init` writes is a complete,
//! commented-free starting point rather than a required schema.
//!
//! ```toml
//! data_dir = ".nova-ledger"
//!
//! [api]
//! bind = "0.0.0.0"
//! port = 9741
//! metrics_port = 9742
//!
//! [log]
//! level = "nova_ledger_node=info,nova_ledger=info,tower_http=debug"
//! format = "pretty"
//!
//! [ledger]
//! fee_treasury = "nova1..."
//! fee_collectors = []
//! paused_regions = []
//! max_page_size = 500
//!
//! [custody]
//! holders = []
//! ```
//!
//! CLI flags override file values; see [`crate::cli`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nova_ledger::LedgerConfig;

use crate::custody::CustodyConfig;
use crate::logging::LogFormat;

/// File name looked up inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".nova-ledger";

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Where the database lives.
    pub data_dir: PathBuf,
    /// HTTP listeners.
    pub api: ApiConfig,
    /// Log filter and format.
    pub log: LogConfig,
    /// Ledger deployment knobs.
    pub ledger: LedgerConfig,
    /// Custody seeds for a new vault.
    pub custody: CustodyConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind: String,
    /// REST API port.
    pub port: u16,
    /// Prometheus port.
    pub metrics_port: u16,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            api: ApiConfig::default(),
            log: LogConfig::default(),
            ledger: LedgerConfig::default(),
            custody: CustodyConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9741,
            metrics_port: 9742,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "nova_ledger_node=info,nova_ledger=info,tower_http=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl NodeConfig {
    /// Parses a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid node configuration")
    }

    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `path` if given, else `<data_dir>/config.toml` if it exists,
    /// else defaults rooted at `data_dir`.
    pub fn resolve(path: Option<&Path>, data_dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = data_dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Self::load(&candidate);
        }
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        })
    }

    /// Serializes to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize node configuration")
    }

    /// Path of the sled database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// `bind:port` of the REST API.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.bind, self.api.port)
    }

    /// `bind:port` of the metrics listener.
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.api.bind, self.api.metrics_port)
    }
}
