//! Error types for the tracker

use thiserror::Error;

/// Errors surfaced by the tracker and its storage layer
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Storage failure, propagated unchanged from the database client
    #[error("Database error: {0}")]
    Database(String),

    /// Admin operation addressed a history (or period) that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency failure: the record changed under us,
    /// or a write would violate the single-open-period invariant
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Unparseable request data (HTTP edge only)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TrackerError>;
