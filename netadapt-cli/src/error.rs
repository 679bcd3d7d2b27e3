//! CLI error type.

use std::fmt;
use std::process::ExitCode;

use netadapt::estimator::ProbeFailure;
use netadapt::logging::LoggingError;
use netadapt::{ClientError, ConfigError, GatewayError};

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Config file missing, unreadable or invalid.
    Config(String),
    /// Logging could not be initialized.
    Logging(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// Building or using the request client failed.
    Client(String),
    /// A probe could not be constructed.
    Probe(String),
    /// A gateway operation failed after its retries.
    Gateway(GatewayError),
    /// Writing output failed.
    Output(String),
}

impl CliError {
    /// Process exit code: 2 for configuration problems, 1 otherwise.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "logging error: {}", msg),
            CliError::Runtime(msg) => write!(f, "runtime error: {}", msg),
            CliError::Client(msg) => write!(f, "client error: {}", msg),
            CliError::Probe(msg) => write!(f, "probe error: {}", msg),
            CliError::Gateway(e) => write!(f, "{}", e),
            CliError::Output(msg) => write!(f, "output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        CliError::Client(e.to_string())
    }
}

impl From<ProbeFailure> for CliError {
    fn from(e: ProbeFailure) -> Self {
        CliError::Probe(e.to_string())
    }
}

impl From<GatewayError> for CliError {
    fn from(e: GatewayError) -> Self {
        CliError::Gateway(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
