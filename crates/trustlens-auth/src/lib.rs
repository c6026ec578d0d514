//! Trustlens Authentication Layer
//!
//! Owns the pieces of session authentication that do not need a browser:
//!
//! - [`state`] - the login state machine every pooled session runs through
//! - [`credentials`] - the credential collaborator boundary (env-backed by default)
//! - [`storage`] - durable per-session cookie persistence
//!
//! # Session Lifecycle
//!
//! Sessions start `Anonymous`, become `Active` either by restoring a saved
//! storage state or by logging in, fall back to `Expired` when the site
//! redirects a fetch to sign-in, and end `Blocked` once they cannot be
//! recovered. Raw credentials are never logged or written to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod credentials;
pub mod error;
pub mod state;
pub mod storage;

pub use credentials::{
    mask_email, CredentialProvider, Credentials, EnvCredentialProvider, StaticCredentialProvider,
};
pub use error::{AuthError, Result};
pub use state::{LoginState, SessionEvent};
pub use storage::{StorageState, StorageStateStore, StoredCookie};
