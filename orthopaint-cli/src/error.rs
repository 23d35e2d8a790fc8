//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use orthopaint::config::ConfigFileError;
use orthopaint::orchestrator::OrchestratorError;
use orthopaint::provider::ProviderError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read or written
    ConfigFile(ConfigFileError),
    /// Failed to build the HTTP client
    HttpClient(ProviderError),
    /// The run stopped before every cell was processed
    Run(OrchestratorError),
    /// Some cells failed; the others were colorized
    CellsFailed { failed: usize, total: usize },
    /// Failed to read cache statistics
    CacheStats(String),
    /// Failed to clear the cache
    CacheClear(String),
    /// Failed to migrate legacy cache entries
    CacheMigrate(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Run(OrchestratorError::DiscoveryUnavailable(_)) => {
                eprintln!();
                eprintln!("The imagery server could not be reached. Check that:");
                eprintln!("  1. [protocol] url in config.ini points at the service endpoint");
                eprintln!("  2. The layer name exists in the server's GetCapabilities");
            }
            CliError::CellsFailed { .. } => {
                eprintln!();
                eprintln!("See the log for per-cell errors. If GDAL or PDAL failed to start,");
                eprintln!("set their paths in the [tools] section of config.ini.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::HttpClient(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Run(e) => write!(f, "{}", e),
            CliError::CellsFailed { failed, total } => {
                write!(f, "{} of {} cells failed", failed, total)
            }
            CliError::CacheStats(msg) => write!(f, "Failed to read cache: {}", msg),
            CliError::CacheClear(msg) => write!(f, "Failed to clear cache: {}", msg),
            CliError::CacheMigrate(msg) => write!(f, "Failed to migrate cache: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::HttpClient(e) => Some(e),
            CliError::Run(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<OrchestratorError> for CliError {
    fn from(e: OrchestratorError) -> Self {
        CliError::Run(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = CliError::CellsFailed {
            failed: 2,
            total: 5,
        };
        assert_eq!(e.to_string(), "2 of 5 cells failed");

        let e = CliError::Config("bad".to_string());
        assert_eq!(e.to_string(), "Configuration error: bad");
    }

    #[test]
    fn test_config_file_error_is_source() {
        let e: CliError = ConfigFileError::WriteError("disk full".to_string()).into();
        assert!(std::error::Error::source(&e).is_some());
    }
}
