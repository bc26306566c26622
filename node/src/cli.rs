//! # CLI Interface
//!
//! Defines the command-line argument structure for `nova-ledger-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{NodeConfig, DEFAULT_DATA_DIR};
use crate::logging::LogFormat;

/// NOVA ledger node.
///
/// Serves the entity registry and funds ledger over HTTP, persists state
/// to disk after every successful mutation, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "nova-ledger-node",
    about = "NOVA ledger node",
    version,
    propagate_version = true
)]
pub struct NovaLedgerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ledger node.
    Run(RunArgs),
    /// Initialize a data directory with a default configuration file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory.
    #[arg(long, short = 'c', env = "NOVA_LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and, by default, the config file.
    #[arg(long, short = 'd', env = "NOVA_LEDGER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Port for the REST API. Overrides the config file.
    #[arg(long, env = "NOVA_LEDGER_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint. Overrides the config file.
    #[arg(long, env = "NOVA_LEDGER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log format, `pretty` or `json`. Overrides the config file.
    #[arg(long, env = "NOVA_LEDGER_LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl RunArgs {
    /// Applies flag overrides on top of a loaded config.
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
        if let Some(port) = self.metrics_port {
            config.api.metrics_port = port;
        }
        if let Some(format) = &self.log_format {
            config.log.format = LogFormat::from_str_lossy(format);
        }
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "NOVA_LEDGER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}
