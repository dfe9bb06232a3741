//! Brain hub daemon.
//!
//! Relays telemetry from one robot to any number of control frontends and
//! forwards their commands back to the robot.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use brain_server::ServerConfig;
use brain_settings::BrainSettings;
use brain_telemetry::{init_telemetry, TelemetryConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain")]
#[command(about = "Relay hub between a teleoperated robot and its frontends")]
#[command(version)]
struct Args {
    /// Settings file (defaults to ~/.brain/settings.json)
    #[arg(short, long, env = "BRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Robot silence tolerated before its session is dropped, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    robot_timeout_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, settings: &mut BrainSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.robot_timeout_ms {
            settings.session.robot_timeout_ms = ms;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn server_config(settings: &BrainSettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        robot_timeout: settings.session.robot_timeout(),
        send_queue: settings.session.send_queue,
        heartbeat_interval: settings.session.heartbeat_interval(),
        shutdown_timeout: Duration::from_secs(5),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args
        .config
        .clone()
        .unwrap_or_else(brain_settings::settings_path);
    let mut settings = brain_settings::read_settings(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("invalid settings")?;

    let telemetry_config =
        TelemetryConfig::from_settings(&settings.logging).context("invalid logging settings")?;
    let telemetry = init_telemetry(&telemetry_config).context("failed to initialize logging")?;

    tracing::info!(settings = %path.display(), "starting brain hub");

    let config = server_config(&settings);
    let handle = brain_server::start(config, telemetry.metrics().clone())
        .await
        .context("failed to start server")?;

    tracing::info!(
        addr = %handle.addr(),
        robot = brain_server::ROBOT_PATH,
        frontends = brain_server::CLIENT_PATH,
        "brain hub ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown().await;
    Ok(())
}
