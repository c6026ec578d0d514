//! Archive error types.

use thiserror::Error;

/// Errors raised while opening, migrating or querying the archive.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database file could not be opened or created.
    #[error("cannot open database at {path}: {reason}")]
    Open {
        /// Requested location
        path: String,
        /// Driver message
        reason: String,
    },

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A stored row no longer decodes into the current types.
    #[error("corrupt record for {target}: {reason}")]
    CorruptRecord {
        /// Target the row belongs to
        target: String,
        /// What failed to decode
        reason: String,
    },

    /// A value does not fit the column type.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// Snapshot or assessment could not be encoded.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
