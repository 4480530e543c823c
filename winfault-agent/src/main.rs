use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use winfault_agent::config;
use winfault_agent::controller::AttackController;
use winfault_agent::http::{self, AppState};
use winfault_agent::interfaces;
use winfault_agent::reaper;
use winfault_agent::runner::PowershellRunner;
use winfault_agent::service::SystemServiceProbe;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from CLI and environment
    let config_manager = config::ConfigManager::from_cli_and_env()?;
    config_manager.validate()?;
    config_manager.init_logging()?;

    let app = config_manager.app;
    info!(
        port = app.port,
        health_port = app.health_port,
        "starting winfault agent"
    );

    let runner = PowershellRunner;
    let controller = Arc::new(AttackController::new(runner.clone(), SystemServiceProbe));

    // The agent's own addresses feed the protective excludes of every
    // attack. Discovery failure degrades to loopback-only, never to none.
    let own_networks = interfaces::discover_own_networks(&runner).await;
    info!(count = own_networks.len(), "discovered own addresses");

    let state = Arc::new(AppState {
        controller: controller.clone(),
        runner,
        own_networks,
        own_ports: app.own_ports(),
    });

    let reaper_handle = reaper::spawn(
        controller.clone(),
        Duration::from_secs(app.reaper_interval_secs),
    );

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), app.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "action API listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Shutdown sweep: leave no prefixed QoS policy behind.
    reaper_handle.abort();
    if let Err(e) = controller.sweep_orphaned_policies().await {
        error!(error = %e, "shutdown sweep failed");
    }
    info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
