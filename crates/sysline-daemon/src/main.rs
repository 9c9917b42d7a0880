//! Sysline Daemon
//!
//! Prints one fixed-width telemetry line to stdout per refresh interval, for
//! status bars that read a command's output line by line.

mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sysline_core::{Config, Host, Monitor, SourceAvailability, Tools};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sink::StdoutSink;

#[derive(Parser)]
#[command(name = "syslined")]
#[command(about = "Fixed-width system telemetry line for status bars")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/sysline/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refresh interval in seconds, overrides the configuration file
    #[arg(short, long)]
    interval: Option<u64>,

    /// Print a single line after one warm-up interval and exit
    #[arg(long, conflicts_with = "probe")]
    once: bool,

    /// Print the detected telemetry sources as JSON and exit
    #[arg(long)]
    probe: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if cli.config.is_some() {
        Config::load(&path)
    } else {
        Config::load_or_default(&path)
    }
    .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(interval) = cli.interval {
        config.interval = interval;
        config.validate().context("Invalid --interval")?;
    }
    info!("Configuration: {:?}", config);
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Stdout carries the line; logs go to stderr.
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = load_config(&cli)?;
    let host = Host::new(&config.root, config.backend_timeout());
    let tools = Tools::from_env(config.backend_timeout());
    let availability = SourceAvailability::probe(&host, &tools).await;

    if cli.probe {
        let json = serde_json::to_string_pretty(&availability)
            .context("Failed to serialize probe result")?;
        println!("{}", json);
        return Ok(());
    }

    let mut monitor = Monitor::new(&config, host, tools, Arc::new(availability)).await;
    let mut sink = StdoutSink::new();

    if cli.once {
        // Rates need two observations.
        monitor.tick().await;
        tokio::time::sleep(config.refresh_interval()).await;
        let line = monitor.tick().await;
        sink.write(&line).context("Failed to write line")?;
        return Ok(());
    }

    // Setup Unix signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    };

    info!(
        "Refreshing every {}s, line width {}",
        config.interval,
        monitor.formatter().width()
    );
    sysline_core::run(&mut monitor, &mut sink, config.refresh_interval(), shutdown).await;

    Ok(())
}
