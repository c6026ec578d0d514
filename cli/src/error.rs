//! Error types reported for failed targets.

use serde::Serialize;
use trustlens_scanner::{LastOutcome, ScrapeError};

/// Serializable error for one failed target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandError {
    /// Response category (e.g. "source_blocking")
    pub code: String,
    /// User-friendly error message
    pub message: String,
    /// Optional debugging context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CommandError {
    /// Create a new command error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Create a command error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl From<&ScrapeError> for CommandError {
    fn from(err: &ScrapeError) -> Self {
        match err {
            ScrapeError::Exhausted { attempts, last } => {
                let last_kind = match last {
                    LastOutcome::SoftBlock(_) => "soft_block",
                    LastOutcome::AuthRequired => "auth_required",
                    LastOutcome::HardFailure(_) => "hard_failure",
                    LastOutcome::Unrecognized(_) => "unrecognized",
                };
                Self::with_details(
                    err.category(),
                    err.to_string(),
                    serde_json::json!({ "attempts": attempts, "last_outcome": last_kind }),
                )
            }
            ScrapeError::Overloaded { depth } => Self::with_details(
                err.category(),
                err.to_string(),
                serde_json::json!({ "queue_depth": depth }),
            ),
            ScrapeError::NeedsManualIntervention { session, .. } => Self::with_details(
                err.category(),
                err.to_string(),
                serde_json::json!({ "session": session.to_string() }),
            ),
            other => Self::new(other.category(), other.to_string()),
        }
    }
}
