//! Process entry point: load settings, run startup recovery, then drive the
//! worker pool until the process receives a shutdown signal.
//!
//! Stopping the process does not drain in-flight probes; a request caught
//! mid-probe lands back in `Queued` or `Processing` state and is picked up
//! by the next startup's recovery pass.

use std::path::PathBuf;

use clap::Parser;
use mailcheck::Settings;

#[derive(Parser, Debug)]
#[command(name = "mailcheck")]
#[command(about = "Bulk email-deliverability verification engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the settings file. Falls back to `MAILCHECK_CONFIG`, then
    /// `./mailcheck.toml`, then `/etc/mailcheck/mailcheck.toml`.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailcheck_common::logging::init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(mailcheck::settings::find_config_file)
        .ok_or_else(|| anyhow::anyhow!("no settings file found and none given via --config"))?;

    let raw = tokio::fs::read_to_string(&config_path).await?;
    let settings = Settings::from_toml_str(&raw)?;

    tracing::info!(path = %config_path.display(), "loaded settings");

    let controller = mailcheck::build(&settings).await?;
    let run_handle = tokio::spawn(controller.run());

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, exiting");

    run_handle.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
