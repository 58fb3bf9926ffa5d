//! Common error types for Termhub

use thiserror::Error;

/// Common result type for Termhub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared across Termhub services: configuration handling and the
/// filesystem work it involves. Service-specific failures live in each
/// service's own error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
