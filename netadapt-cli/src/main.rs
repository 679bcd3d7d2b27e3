//! netadapt CLI - Command-line interface
//!
//! Inspect the tier profile table, probe a link to see which tier it lands
//! in, and read resources through the adaptive gateway.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use runner::RunnerOptions;

/// netadapt - network-condition aware request gateway
#[derive(Parser)]
#[command(name = "netadapt")]
#[command(version)]
#[command(about = "Classify network conditions and shape requests by tier")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv), overrides the configured log level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of ~/.netadapt/config.ini
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tier → profile table
    Profiles {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe one or more URLs and report the estimated tier
    Probe(commands::probe::ProbeArgs),

    /// Read a resource through the adaptive gateway
    Fetch(commands::fetch::FetchArgs),

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = RunnerOptions {
        config_path: cli.config,
        verbosity: cli.verbose,
    };

    let result = match cli.command {
        Commands::Profiles { json } => commands::profiles::run(&options, json),
        Commands::Probe(args) => commands::probe::run(&options, args),
        Commands::Fetch(args) => commands::fetch::run(&options, args),
        Commands::Config { action } => commands::config::run(&options, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}
