//! Error types for the relay

use thiserror::Error;

/// Main error type for server setup and I/O
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (bind, accept, serve)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using the relay Error
pub type Result<T> = std::result::Result<T, Error>;
