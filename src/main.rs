#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use wayfarer::config::Config;
use wayfarer::gateway::run_gateway;

#[derive(Parser)]
#[command(
    name = "wayfarer",
    version,
    about = "Travel assistant chat backend with threaded history and streaming relay"
)]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = "wayfarer.toml")]
    config: PathBuf,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    run_gateway(config).await
}
