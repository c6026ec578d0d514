//! Scrape pipeline errors and the outcome of the last failed attempt.

use crate::parser::ParseError;
use std::fmt;
use thiserror::Error;
use trustlens_browser::{FetchOutcome, Interstitial, SessionError, SessionId};

/// Last observed result of an exhausted scrape, kept for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastOutcome {
    /// Challenge or rate-limit page
    SoftBlock(String),
    /// Redirected to sign-in
    AuthRequired,
    /// Timeout, transport error or unexpected page
    HardFailure(String),
    /// Page loaded but its structure was not recognized
    Unrecognized(String),
}

impl LastOutcome {
    /// Capture a non-success fetch outcome. Returns `None` for `Success`.
    #[must_use]
    pub fn from_fetch(outcome: &FetchOutcome) -> Option<Self> {
        match outcome {
            FetchOutcome::Success(_) => None,
            FetchOutcome::SoftBlock(reason) => Some(Self::SoftBlock(reason.clone())),
            FetchOutcome::AuthRequired => Some(Self::AuthRequired),
            FetchOutcome::HardFailure(reason) => Some(Self::HardFailure(reason.clone())),
        }
    }
}

impl fmt::Display for LastOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SoftBlock(reason) => write!(f, "soft block: {reason}"),
            Self::AuthRequired => write!(f, "authentication required"),
            Self::HardFailure(reason) => write!(f, "hard failure: {reason}"),
            Self::Unrecognized(reason) => write!(f, "unrecognized page: {reason}"),
        }
    }
}

/// Terminal result of a failed submission.
///
/// Cloneable because every caller attached to the same in-flight target
/// receives the same result.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    /// Retry budget consumed
    #[error("gave up after {attempts} attempts, last outcome: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last observed outcome
        last: LastOutcome,
    },

    /// Queue is full
    #[error("scheduler overloaded: queue depth {depth} reached")]
    Overloaded {
        /// Configured queue depth
        depth: usize,
    },

    /// All sessions are blocked
    #[error("no session available")]
    NoSessionAvailable,

    /// Login needs a human
    #[error("{session} needs manual intervention: {interstitial}")]
    NeedsManualIntervention {
        /// Affected session
        session: SessionId,
        /// What the login flow ran into
        interstitial: Interstitial,
    },

    /// Page structure not recognized and fetch retries exhausted
    #[error("unrecognized page: {0}")]
    Unrecognized(String),

    /// Caller cancelled before the submission completed
    #[error("submission cancelled")]
    Cancelled,

    /// Archive read or write failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Scheduler stopped
    #[error("scheduler is shutting down")]
    Shutdown,

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// Stable response category for API collaborators.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Exhausted {
                last: LastOutcome::Unrecognized(_),
                ..
            }
            | Self::Unrecognized(_) => "target_unrecognized",
            Self::Exhausted { .. } => "source_blocking",
            Self::Overloaded { .. } => "overloaded",
            Self::NoSessionAvailable => "session_pool",
            Self::NeedsManualIntervention { .. } => "manual_intervention",
            Self::Cancelled => "cancelled",
            Self::Persistence(_) | Self::Shutdown | Self::Internal(_) => "internal",
        }
    }
}

impl From<SessionError> for ScrapeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoSessionAvailable => Self::NoSessionAvailable,
            SessionError::NeedsManualIntervention {
                session,
                interstitial,
            } => Self::NeedsManualIntervention {
                session,
                interstitial,
            },
            SessionError::ShuttingDown => Self::Shutdown,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ParseError> for ScrapeError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Unrecognized(reason) => Self::Unrecognized(reason),
        }
    }
}

impl From<trustlens_db::DatabaseError> for ScrapeError {
    fn from(err: trustlens_db::DatabaseError) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
