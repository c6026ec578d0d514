use crate::session::{Interstitial, SessionId};
use thiserror::Error;
use trustlens_auth::AuthError;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

/// Errors surfaced by the session pool.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every session is blocked, so nothing can be handed out
    #[error("no session available: all sessions are blocked")]
    NoSessionAvailable,

    /// Login stopped at a step that needs a human
    #[error("{session} needs manual intervention: {interstitial}")]
    NeedsManualIntervention {
        session: SessionId,
        interstitial: Interstitial,
    },

    /// The session was retired while preparing it
    #[error("{session} is blocked: {reason}")]
    Blocked { session: SessionId, reason: String },

    /// Login failed but the session may be retried
    #[error("login failed for {session}: {reason}")]
    LoginFailed { session: SessionId, reason: String },

    /// The pool is shutting down
    #[error("session pool is shutting down")]
    ShuttingDown,

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
