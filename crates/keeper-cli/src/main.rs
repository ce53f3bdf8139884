//! Keeper CLI - Deliver, chain and rotate backup artifacts.

use anyhow::Context;
use clap::Parser;
use keeper_cli::commands;
use keeper_cli::{Cli, Command, Formatter, KeeperConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    // Load configuration
    let path = match cli.config {
        Some(path) => path,
        None => KeeperConfig::default_path()?,
    };
    let config = KeeperConfig::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    // Determine output format
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.server.format);

    // Determine color setting
    let color_enabled = !cli.no_color && config.server.color;

    // Create formatter
    let formatter = Formatter::new(format, color_enabled);

    // Handle commands
    match cli.command {
        Command::Start(args) => commands::execute_start(args, &config, &formatter).await?,
        Command::Jobs => commands::execute_jobs(&config, &formatter).await?,
        Command::Check => commands::execute_check(&config, &formatter).await?,
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `-v`
fn init_tracing(verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}
