// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Ledger Node
//!
//! Entry point for the `nova-ledger-node` binary. Parses CLI arguments,
//! loads configuration, restores ledger state from disk, and serves the
//! REST API and the Prometheus endpoint.
//!
//! The binary supports three subcommands:
//!
//! - `run`: start the ledger node
//! - `init`: write a default configuration into a data directory
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod custody;
mod logging;
mod metrics;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use nova_ledger::{Collaborators, Governance, LedgerDb, LedgerService, LedgerState};

use cli::{Commands, NovaLedgerCli};
use config::{NodeConfig, CONFIG_FILE_NAME};
use logging::LogFormat;
use metrics::LedgerMetrics;
use sink::TracingSink;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaLedgerCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: restores state, then serves API and metrics until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let mut config = NodeConfig::resolve(args.config.as_deref(), &args.data_dir)?;
    args.apply(&mut config);

    logging::init_logging(&config.log.level, config.log.format);

    tracing::info!(
        api = %config.api_addr(),
        metrics = %config.metrics_addr(),
        data_dir = %config.data_dir.display(),
        "starting nova-ledger-node"
    );

    // --- Persistent storage ---
    let db_path = config.db_path();
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let state = match db.load_state().context("failed to restore ledger state")? {
        Some(state) => {
            tracing::info!(
                entities = state.registry.live_count(),
                state_root = %hex::encode(state.state_root()),
                "ledger state restored"
            );
            state
        }
        None => {
            tracing::info!("no stored state, starting empty ledger");
            LedgerState::new()
        }
    };

    // --- Custody ---
    let vault = Arc::new(custody::restore_custody(&db, &state, &config.custody)?);

    // --- Metrics ---
    let ledger_metrics = Arc::new(LedgerMetrics::new().context("failed to register metrics")?);

    // --- Ledger ---
    let governance = Arc::new(Governance::from_config(&config.ledger));
    let ledger = Arc::new(LedgerService::new(
        config.ledger.clone(),
        state,
        Collaborators {
            pause: governance.clone(),
            access: governance.clone(),
            gateway: vault.clone(),
            sink: Arc::new(TracingSink::new(Arc::clone(&ledger_metrics))),
        },
    ));
    ledger_metrics
        .entities_registered
        .set(ledger.entity_count() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (ledger {})",
            env!("CARGO_PKG_VERSION"),
            nova_ledger::config::LEDGER_VERSION,
        ),
        ledger,
        governance,
        vault,
        db: db.clone(),
        metrics: Arc::clone(&ledger_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = config.api_addr();
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&ledger_metrics));
    let metrics_addr = config.metrics_addr();
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("nova-ledger-node stopped");
    Ok(())
}

/// Writes a default `config.toml` into the data directory.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("nova_ledger_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = NodeConfig {
        data_dir: data_dir.clone(),
        ..NodeConfig::default()
    };
    std::fs::write(&config_path, config.to_toml()?)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    tracing::info!(path = %config_path.display(), "configuration written");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config file    : {}", config_path.display());
    println!("  API            : {}", config.api_addr());
    println!("  Metrics        : {}", config.metrics_addr());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("nova-ledger-node {}", env!("CARGO_PKG_VERSION"));
    println!("ledger           {}", nova_ledger::config::LEDGER_VERSION);
    println!("state format     v{}", nova_ledger::config::LEDGER_STATE_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never resolves and the
/// other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
