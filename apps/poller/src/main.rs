#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sysinfo::System;
use tracing::{debug, error, info, warn};

mod client;
mod config;
mod error;
mod health;
mod metrics;
mod monitoring;
mod orchestrator;
mod pipeline;
mod pool;

use client::ControlPlaneClient;
use config::Config;
use error::AppError;
use health::HealthServer;
use logger::init_tracing;
use metrics::Metrics;
use monitoring::MonitoringExecutor;
use orchestrator::Orchestrator;
use pipeline::Delivery;

/// Sent on every outbound request unless a check overrides it
pub(crate) const USER_AGENT: &str = "AlertPriority-Poller/1.0";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(version, about = "AlertPriority synthetic monitoring poller")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!(error = %e, "Configuration error");
            return Err(e.into());
        }
    };
    init_tracing(&config.log_level);

    let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
    info!(
        version = VERSION,
        git_hash = env!("POLLER_GIT_HASH"),
        git_branch = env!("POLLER_GIT_BRANCH"),
        build_time = env!("POLLER_BUILD_TIME"),
        %hostname,
        "AlertPriority Poller starting"
    );
    info!(
        api_url = %config.api_url,
        poll_interval = config.poll_interval,
        max_concurrency = config.max_concurrency,
        batch_size = config.batch_size,
        batch_interval = config.batch_interval,
        "Configuration loaded"
    );
    debug!("{config}");

    let metrics = Arc::new(Metrics::new());
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let health = match HealthServer::start(health_addr, metrics.clone()) {
        Ok(server) => {
            info!(addr = %server.local_addr(), "Health endpoint listening");
            Some(server)
        }
        Err(e) => {
            warn!(error = %e, addr = %health_addr, "Failed to start health endpoint, continuing without it");
            None
        }
    };

    let control_plane = Arc::new(ControlPlaneClient::new(&config)?);
    let executor = Arc::new(MonitoringExecutor::new(config.tls_insecure)?);
    let orchestrator = Orchestrator::new(config, control_plane, executor, metrics, VERSION);

    let result = orchestrator.run(&hostname, shutdown_signal()).await;

    if let Some(health) = health {
        health.stop().await;
    }

    let report = result.map_err(AppError::Register)?;
    match report.final_delivery {
        Delivery::Idle => {}
        Delivery::Submitted { count, accepted, rejected } => {
            debug!(count, accepted, rejected, drained = report.drained, "Final flush delivered");
        }
        Delivery::Requeued { count } | Delivery::Dropped { count } => {
            warn!(count, drained = report.drained, "Final flush failed, results were not delivered");
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Received shutdown signal, draining");
}
