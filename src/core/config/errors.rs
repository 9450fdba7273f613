//! Configuration error types and validation traits.

use thiserror::Error;

use crate::core::errors::HistoError;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Error indicating that a configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Error indicating that a configuration file could not be read or parsed.
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: String, message: String },
}

impl From<ConfigError> for HistoError {
    fn from(err: ConfigError) -> Self {
        HistoError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// A trait for validating configuration parameters.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Validates a worker count.
    fn validate_worker_threads(&self, workers: usize) -> Result<(), ConfigError> {
        if workers == 0 {
            Err(ConfigError::InvalidConfig {
                message: "worker_threads must be greater than 0".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
