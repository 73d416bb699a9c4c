//! Error types for lrumap

use std::fmt;

/// Result type alias for lrumap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache construction and consistency checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Capacity or another construction parameter is invalid
    InvalidConfiguration(String),

    /// Mapping and recency order disagree
    Corrupted(String),
}

impl Error {
    pub(crate) fn zero_capacity() -> Self {
        Error::InvalidConfiguration("capacity must be greater than 0".to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Corrupted(msg) => write!(f, "Cache corrupted: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
