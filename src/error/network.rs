//! Network communication and socket errors.

use thiserror::Error;

/// Network communication errors.
///
/// Encompasses listener setup, backend connection failures, and connection
/// lifecycle issues. Probe outcomes are never errors; see
/// [`ProbeOutcome`](crate::probe::ProbeOutcome).
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection to a backend failed
    #[error("Connection failed to {address}")]
    ConnectionFailed { address: String },

    /// Connection was unexpectedly closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Port binding failed
    #[error("Port binding failed: {address}")]
    BindFailed { address: String },

    /// Invalid network address or configuration
    #[error("Invalid network address: {address}")]
    InvalidAddress { address: String },
}
