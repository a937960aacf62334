//! Error types for `pgseal` operations.

use std::fmt;

/// Main error type for `pgseal` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database connection or a pgcrypto function call failed
    #[error("execution failed: {0}")]
    Execution(#[from] ConnectionError),

    /// A stored value is not a well-formed value envelope
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Unsupported envelope version
    #[error("unsupported envelope version: {version} (supported: {supported})")]
    UnsupportedVersion {
        /// The version found in the stored value
        version: u8,
        /// Supported versions
        supported: String,
    },

    /// The evaluated projection did not produce the expected column
    #[error("query returned no value for column `{0}`")]
    MissingColumn(String),
}

/// Errors raised by a [`Connection`](crate::connection::Connection) implementation.
///
/// Messages reported by the database are carried through untouched.
#[derive(Debug)]
pub enum ConnectionError {
    /// No connection could be obtained
    Unavailable(String),

    /// The database rejected the statement (bad key, wrong passphrase, ...)
    Database(String),

    /// The result could not be read as text
    Decode(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "connection unavailable: {msg}"),
            Self::Database(msg) => write!(f, "database error: {msg}"),
            Self::Decode(msg) => write!(f, "result decode failed: {msg}"),
        }
    }
}

impl std::error::Error for ConnectionError {}
