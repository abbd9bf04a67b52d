//! Error types for aquasync-store.

use std::path::PathBuf;

/// Result type for aquasync-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in aquasync-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid timestamp stored in the database.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
