//! Error types for session authentication.

use crate::state::{LoginState, SessionEvent};
use std::path::PathBuf;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login state machine has no edge for this event
    #[error("invalid session transition: {event:?} while {from:?}")]
    InvalidTransition {
        /// State the session was in
        from: LoginState,
        /// Event that was rejected
        event: SessionEvent,
    },

    /// The credential provider could not supply a required value
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// Reading or writing a storage-state file failed
    #[error("storage state I/O error at {path}: {source}")]
    StorageIo {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A storage-state file could not be (de)serialized
    #[error("invalid storage state: {0}")]
    StorageFormat(#[from] serde_json::Error),
}

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
