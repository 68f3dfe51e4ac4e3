//! Common error types for vasr

use thiserror::Error;

/// Common result type for vasr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by the vasr crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio container could not be opened or decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio buffer could not be encoded to disk
    #[error("Audio encode error: {0}")]
    Encode(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        match err {
            symphonia::core::errors::Error::IoError(e) => Error::Io(e),
            other => Error::Decode(other.to_string()),
        }
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Error::Io(e),
            other => Error::Encode(other.to_string()),
        }
    }
}
