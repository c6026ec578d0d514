//! Login lifecycle of one browser session.
//!
//! ```text
//! Anonymous --BeginLogin--> Authenticating --LoginSucceeded--> Active
//! Anonymous --Restored----> Active
//! Authenticating --LoginFailed--> Expired
//! Active --ExpiryDetected--> Expired --BeginLogin--> Authenticating
//! (any but Blocked) --Retire--> Blocked
//! ```

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    /// No credentials applied yet
    #[default]
    Anonymous,
    /// Login flow in progress
    Authenticating,
    /// Usable for fetches
    Active,
    /// The site stopped honoring the session; needs re-login
    Expired,
    /// Retired for good
    Blocked,
}

/// Triggers that move a session between login states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Start submitting credentials
    BeginLogin,
    /// A persisted storage state was applied and validated
    Restored,
    /// Login flow finished on a signed-in page
    LoginSucceeded,
    /// Login flow was rejected or stopped at an interstitial
    LoginFailed,
    /// A fetch was redirected back to sign-in
    ExpiryDetected,
    /// Session is unusable and must not be handed out again
    Retire,
}

impl LoginState {
    /// Apply an event, returning the next state.
    pub fn transition(self, event: SessionEvent) -> Result<LoginState> {
        use LoginState::{Active, Anonymous, Authenticating, Blocked, Expired};
        use SessionEvent::{
            BeginLogin, ExpiryDetected, LoginFailed, LoginSucceeded, Restored, Retire,
        };

        let next = match (self, event) {
            (Blocked, _) => None,
            (_, Retire) => Some(Blocked),
            (Anonymous | Expired, BeginLogin) => Some(Authenticating),
            (Anonymous, Restored) | (Authenticating, LoginSucceeded) => Some(Active),
            (Authenticating, LoginFailed) | (Active, ExpiryDetected) => Some(Expired),
            _ => None,
        };

        next.ok_or(AuthError::InvalidTransition { from: self, event })
    }

    /// Whether fetches may run on this session.
    #[must_use]
    pub fn is_usable(self) -> bool {
        self == Self::Active
    }

    /// Whether the session is permanently retired.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Blocked
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Blocked => "blocked",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_path() {
        let state = LoginState::default();
        let state = state.transition(SessionEvent::BeginLogin).expect("begin");
        assert_eq!(state, LoginState::Authenticating);
        let state = state.transition(SessionEvent::LoginSucceeded).expect("success");
        assert!(state.is_usable());
    }

    #[test]
    fn test_expiry_and_relogin() {
        let state = LoginState::Active
            .transition(SessionEvent::ExpiryDetected)
            .expect("expire");
        assert_eq!(state, LoginState::Expired);
        let state = state.transition(SessionEvent::BeginLogin).expect("relogin");
        assert_eq!(state, LoginState::Authenticating);
        let state = state.transition(SessionEvent::LoginFailed).expect("fail");
        assert_eq!(state, LoginState::Expired);
    }

    #[test]
    fn test_restore_only_from_anonymous() {
        assert_eq!(
            LoginState::Anonymous
                .transition(SessionEvent::Restored)
                .expect("restore"),
            LoginState::Active
        );
        assert!(LoginState::Expired.transition(SessionEvent::Restored).is_err());
    }

    #[test]
    fn test_blocked_is_terminal() {
        let state = LoginState::Active
            .transition(SessionEvent::Retire)
            .expect("retire");
        assert!(state.is_terminal());
        for event in [
            SessionEvent::BeginLogin,
            SessionEvent::Restored,
            SessionEvent::LoginSucceeded,
            SessionEvent::Retire,
        ] {
            assert!(state.transition(event).is_err());
        }
    }

    #[test]
    fn test_invalid_edges() {
        assert!(LoginState::Active.transition(SessionEvent::BeginLogin).is_err());
        assert!(LoginState::Anonymous
            .transition(SessionEvent::ExpiryDetected)
            .is_err());
        assert!(LoginState::Expired
            .transition(SessionEvent::LoginSucceeded)
            .is_err());
    }
}
