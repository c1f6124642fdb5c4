//! CLI interface for poly-pulse
//!
//! Provides subcommands for:
//! - `run`: Start the signal engine and paper trader
//! - `status`: Show current state
//! - `config`: Show effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-pulse")]
#[command(about = "Signal ensemble and paper trader for Polymarket BTC up/down markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the signal engine and paper trader
    Run(RunArgs),
    /// Show current state
    Status,
    /// Show effective configuration
    Config,
}
