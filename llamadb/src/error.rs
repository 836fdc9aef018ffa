//! Error types for llamadb

use std::time::Duration;

use thiserror::Error;

/// Result type alias for llamadb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, executing or pooling queries
#[derive(Error, Debug)]
pub enum Error {
    /// A driver handle could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement failed inside the driver (bad SQL, constraint violation, I/O)
    #[error("Execution error: {0}")]
    Execution(String),

    /// No connection became available before the acquire timeout elapsed
    #[error(
        "Pool exhausted: no connection available after {timeout:?} (max_connections={max_connections})"
    )]
    PoolExhausted {
        max_connections: usize,
        timeout: Duration,
    },

    /// The pool was shut down with `close_all`
    #[error("Pool is closed")]
    PoolClosed,

    /// The query builder was misused
    #[error("Invalid query: {0}")]
    BuildValidation(String),

    /// Operation on a closed connection, or on a cursor whose connection closed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Type conversion error
    #[error("Type conversion error: expected {expected}, got {actual}")]
    TypeConversion {
        expected: &'static str,
        actual: String,
    },

    /// Column not found in row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

impl Error {
    pub(crate) fn execution(err: impl std::fmt::Display) -> Self {
        Error::Execution(err.to_string())
    }

    pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
