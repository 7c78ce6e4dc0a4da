//! Error types shared by the engine crates.

use thiserror::Error;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or out-of-range configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
