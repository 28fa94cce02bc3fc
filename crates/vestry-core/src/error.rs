//! Error types for vestry-core

use thiserror::Error;

/// Result type alias using vestry-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vestry-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failure; the store cannot be trusted and open aborts
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record, queue item, or conflict not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input rejected synchronously, no state mutated
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption collaborator failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport-level delivery failure (non-2xx status, connectivity)
    #[error("Transport error: {0}")]
    Transport(String),
}
