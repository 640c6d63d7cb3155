//! Error types for stockroom-core

use thiserror::Error;

/// Result type alias using stockroom-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stockroom-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or conflict not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Table name outside the syncable set
    #[error("Unknown sync table: {0}")]
    UnknownTable(String),

    /// Request never produced a response (timeout, connection refused, ...)
    #[error("Sync transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("Sync server error: {message} ({status})")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server-provided message, or the raw body
        message: String,
    },

    /// Server answered with a body we cannot interpret
    #[error("Invalid sync payload: {0}")]
    InvalidPayload(String),

    /// Invalid sync configuration
    #[error("Invalid sync configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request later may succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Server { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidPayload(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}
