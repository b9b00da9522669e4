//! volwatch - sliding-window trade volume alert

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use volwatch_bot::{AppConfig, Application, Mode};

/// Alert when an instrument's trailing-window volume crosses a threshold
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VOLWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Observation mode: poll or stream
    #[arg(short, long)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection
    volwatch_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > VOLWATCH_CONFIG > config/default.toml > built-in defaults
    let config_path = args
        .config
        .or_else(|| std::env::var("VOLWATCH_CONFIG").ok());

    let mut config = AppConfig::load(config_path.as_deref())?;
    config.apply_env()?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    volwatch_telemetry::init_logging(&config.telemetry.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = config_path.as_deref().unwrap_or("<default>"),
        "Starting volwatch"
    );

    let app = Application::new(config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                signal_token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    app.run(shutdown).await?;
    Ok(())
}
