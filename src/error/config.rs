//! Configuration loading and validation errors.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors.
///
/// Covers errors in configuration file parsing, protocol binding, and
/// environment variable processing. Everything here is fatal at load time;
/// the running core assumes a validated configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid value for configuration field
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A configured protocol names a probe the registry does not know
    #[error("Unknown probe name: {name}")]
    UnknownProbe { name: String },

    /// A regex pattern on a protocol entry failed to compile
    #[error("Invalid regex pattern on protocol '{protocol}': {message}")]
    InvalidRegex { protocol: String, message: String },

    /// The catch-all entry must be the last protocol in the chain
    #[error("Protocol '{name}' must be last in the protocol list")]
    CatchAllNotLast { name: String },

    /// The protocol list is empty
    #[error("At least one protocol must be configured")]
    NoProtocols,

    /// TOML deserialization error
    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}
