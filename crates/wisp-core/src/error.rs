//! Error types for wisp-core

use thiserror::Error;

/// Result type alias for wisp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the server from starting or running.
///
/// Per-request failures never surface here; they become HTTP responses.
#[derive(Debug, Error)]
pub enum Error {
    /// Environment variable could not be parsed
    #[error("Invalid value for {var}: {value:?}")]
    Config { var: &'static str, value: String },

    /// Bind address could not be built
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// IO error (bind, accept, socket options)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper error
    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),
}
