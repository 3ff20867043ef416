//! Error handling for the shunt demultiplexer.
//!
//! This module provides a hierarchical error system using `thiserror` that
//! covers configuration loading and network operations. Probe evaluation is
//! deliberately *not* represented here: a probe expresses every outcome in
//! the three-valued [`ProbeOutcome`](crate::probe::ProbeOutcome) and never
//! signals an out-of-band error.

mod config;
mod network;

pub use config::ConfigError;
pub use network::NetworkError;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the shunt demultiplexer.
///
/// Each variant maps to a functional domain while keeping a single error
/// surface for callers of the library.
#[derive(Error, Debug)]
pub enum ShuntError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// I/O operations errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic system errors for unrecoverable conditions
    #[error("System error: {message}")]
    System { message: String },
}

impl From<tracing::subscriber::SetGlobalDefaultError> for ShuntError {
    fn from(err: tracing::subscriber::SetGlobalDefaultError) -> Self {
        ShuntError::system(format!("Failed to set global tracing subscriber: {err}"))
    }
}

impl From<figment::Error> for ShuntError {
    fn from(err: figment::Error) -> Self {
        let config_error = if err.path.is_empty() {
            ConfigError::ParseError {
                message: err.to_string(),
            }
        } else {
            let field = err.path.join(".");
            match err.kind {
                figment::error::Kind::MissingField(field) => ConfigError::MissingField {
                    field: field.to_string(),
                },
                figment::error::Kind::InvalidType(_, _) => ConfigError::InvalidValue {
                    field,
                    reason: "invalid type".to_string(),
                },
                figment::error::Kind::UnknownVariant(_, _) => ConfigError::InvalidValue {
                    field,
                    reason: "unknown variant".to_string(),
                },
                figment::error::Kind::UnknownField(..) => ConfigError::InvalidValue {
                    field,
                    reason: "unknown field".to_string(),
                },
                figment::error::Kind::InvalidValue(_, _) => ConfigError::InvalidValue {
                    field,
                    reason: "invalid value".to_string(),
                },
                _ => ConfigError::ParseError {
                    message: err.to_string(),
                },
            }
        };
        ShuntError::Config(config_error)
    }
}

impl ShuntError {
    /// Creates a new ShuntError with a system message.
    pub fn system(message: impl Into<String>) -> Self {
        ShuntError::System {
            message: message.into(),
        }
    }

    /// Creates a ShuntError for a failed backend connection.
    pub fn connection_failed(address: impl Into<String>) -> Self {
        ShuntError::Network(NetworkError::ConnectionFailed {
            address: address.into(),
        })
    }

    /// Creates a ShuntError for a configuration file not found.
    pub fn config_file_not_found(path: impl Into<PathBuf>) -> Self {
        ShuntError::Config(ConfigError::FileNotFound { path: path.into() })
    }

    /// Creates a ShuntError for a general configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        ShuntError::Config(ConfigError::ParseError {
            message: message.into(),
        })
    }
}

/// Result type alias for shunt operations.
pub type Result<T> = std::result::Result<T, ShuntError>;
