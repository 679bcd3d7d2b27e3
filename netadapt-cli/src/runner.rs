//! Shared setup for commands that talk to the network.
//!
//! Logging is installed before the multi-threaded runtime starts so the
//! local UTC offset for timestamps can still be determined.

use std::future::Future;
use std::path::PathBuf;

use netadapt::logging::WorkerGuard;
use netadapt::{init_logging, ConfigFile};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Global options parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub config_path: Option<PathBuf>,
    pub verbosity: u8,
}

/// Load the config named by `--config`, or the default one.
pub fn load_config(options: &RunnerOptions) -> Result<ConfigFile, CliError> {
    let config = match &options.config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Log filter implied by `-v` flags, if any.
fn verbosity_filter(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    pub fn new(options: &RunnerOptions) -> Result<Self, CliError> {
        let mut config = load_config(options)?;
        if let Some(level) = verbosity_filter(options.verbosity) {
            config.logging.level = level.to_string();
        }
        let log_guard = init_logging(&config.logging)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            log_level = %self.config.logging.level,
            "netadapt starting"
        );
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(verbosity_filter(0), None);
        assert_eq!(verbosity_filter(1), Some("info"));
        assert_eq!(verbosity_filter(2), Some("debug"));
        assert_eq!(verbosity_filter(9), Some("trace"));
    }
}
