//! Error types for the device link.

use thiserror::Error;

/// Device link errors.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Transport I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect target failed validation (bad IP, empty device path)
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    /// Serial device could not be opened
    #[error("failed to open serial port {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Initial HTTP probe of the device failed
    #[error("device probe failed: {0}")]
    ProbeFailed(String),

    /// Mid-session transport failure; the session is over
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Device closed the connection
    #[error("device disconnected")]
    Disconnected,
}

/// Convenient Result type for device-link operations.
pub type LinkResult<T> = Result<T, LinkError>;
