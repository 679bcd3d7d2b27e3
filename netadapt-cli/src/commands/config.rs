//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::PathBuf;

use clap::Subcommand;
use netadapt::config::config_file_path;
use netadapt::ConfigFile;

use crate::error::CliError;
use crate::runner::{load_config, RunnerOptions};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration as INI
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(options: &RunnerOptions, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(options),
        ConfigCommands::Show => run_show(options),
        ConfigCommands::Init { force } => run_init(options, force),
    }
}

fn target_path(options: &RunnerOptions) -> Result<PathBuf, CliError> {
    options
        .config_path
        .clone()
        .or_else(config_file_path)
        .ok_or_else(|| CliError::Config("could not determine home directory".to_string()))
}

fn run_path(options: &RunnerOptions) -> Result<(), CliError> {
    println!("{}", target_path(options)?.display());
    Ok(())
}

fn run_show(options: &RunnerOptions) -> Result<(), CliError> {
    let config = load_config(options)?;
    config.to_ini().write_to(&mut std::io::stdout())?;
    Ok(())
}

fn run_init(options: &RunnerOptions, force: bool) -> Result<(), CliError> {
    let path = target_path(options)?;
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
