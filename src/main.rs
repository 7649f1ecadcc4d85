#![forbid(unsafe_code)]

//! `mcp-bridge` — MCP worker host binary.
//!
//! Bootstraps configuration, builds the worker supervisor, and keeps the
//! configured stdio backends available until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_bridge::config::HostConfig;
use mcp_bridge::worker::WorkerSupervisor;
use mcp_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", about = "MCP worker host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Boot every stdio backend eagerly instead of on first use.
    #[arg(long)]
    prewarm: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mcp-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = HostConfig::load_from_path(&args.config)?;
    config.load_credentials();
    let config = Arc::new(config);
    info!(backends = config.backends.len(), "configuration loaded");

    // ── Build supervisor ────────────────────────────────
    let supervisor = WorkerSupervisor::new(Arc::clone(&config));

    for status in supervisor.inventory().await {
        info!(
            id = %status.id,
            label = %status.label,
            transport = ?status.transport,
            state = status.status.as_str(),
            "backend registered"
        );
    }

    if args.prewarm {
        for backend in &config.backends {
            match supervisor.list_tools(&backend.id).await {
                Ok(_) => info!(id = %backend.id, "backend prewarmed"),
                Err(err) => {
                    warn!(id = %backend.id, error = %err, "backend prewarm failed");
                }
            }
        }
    }

    info!("mcp-bridge ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    supervisor.shutdown().await;
    info!("mcp-bridge shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
