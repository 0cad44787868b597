//! CLI for metricol — host metrics collection agent.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "metricol")]
#[command(about = "metricol — poll host and service metrics, ship them to graphite or statsd")]
#[command(version = metricol_core::VERSION)]
struct Cli {
    /// Log filter (DEBUG, INFO, WARNING, ERROR or any RUST_LOG directive).
    /// Overrides `log_level` from the config's [DEFAULT] section.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled input and output section until SIGINT/SIGTERM
    Run {
        /// Path to the INI configuration file
        config: PathBuf,
    },

    /// Validate the configuration and build every section without starting it
    Check {
        /// Path to the INI configuration file
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => commands::run::run(&config, cli.log_level.as_deref()),
        Commands::Check { config } => commands::check::run(&config, cli.log_level.as_deref()),
    }
}
