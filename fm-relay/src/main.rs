//! remotefm-relay binary entry point.
//!
//! Usage:
//! ```bash
//! remotefm-relay --config relay.toml
//! remotefm-relay --bind 127.0.0.1:8000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Relay hub for the Remote File Manager.
#[derive(Parser, Debug)]
#[command(name = "remotefm-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults apply if it does not exist)
    #[arg(long, short, default_value = "relay.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remotefm_relay=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = remotefm_relay::server::load_config(&cli.config, cli.bind)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    remotefm_relay::server::run(config)
        .await
        .context("relay stopped")
}
