//! Sysline System Tray Applet
//!
//! Shows the telemetry line as the title and tooltip of a tray item.
//! Works with both GNOME (via AppIndicator extension) and KDE (native SNI).

mod tray;

use std::sync::Arc;

use anyhow::{Context, Result};
use sysline_core::{Config, Host, Monitor, SourceAvailability, Tools};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tray::create_tray;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sysline_applet=info".parse()?)
                .add_directive("sysline_core=info".parse()?),
        )
        .init();

    info!("Sysline applet starting...");

    let path = Config::default_path();
    let config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let host = Host::new(&config.root, config.backend_timeout());
    let tools = Tools::from_env(config.backend_timeout());
    let availability = SourceAvailability::probe(&host, &tools).await;
    let mut monitor = Monitor::new(&config, host, tools, Arc::new(availability)).await;

    // ksni runs its own D-Bus loop on a separate thread
    let (service, mut sink, mut quit_rx) = create_tray(config.icon.clone());
    service.spawn();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = quit_rx.recv() => info!("Quit requested from tray menu"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    };

    sysline_core::run(&mut monitor, &mut sink, config.refresh_interval(), shutdown).await;

    info!("Sysline applet stopped");
    Ok(())
}
