//! CLI command definitions and argument parsing.

use crate::config::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keeper - Deliver, chain and rotate backup artifacts across storages.
#[derive(Debug, Parser)]
#[command(name = "keeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (names only)
    Quiet,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => OutputFormat::Table,
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Quiet => OutputFormat::Quiet,
        }
    }
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run backup jobs
    Start(StartArgs),

    /// List configured jobs
    Jobs,

    /// Validate the configuration and storages
    Check,
}

/// Arguments for the start command.
#[derive(Debug, Parser)]
pub struct StartArgs {
    /// Jobs to run ("all" or omitted runs every job)
    pub jobs: Vec<String>,
}

impl StartArgs {
    /// Whether every configured job should run
    pub fn runs_all(&self) -> bool {
        self.jobs.is_empty() || self.jobs.iter().any(|job| job == "all")
    }
}
