//! Browser side of the pipeline.
//!
//! One headless Chrome with an isolated context per session slot, the
//! session pool that keeps those contexts signed in, and the fetcher that
//! loads review pages through them.

pub mod actions;
pub mod classify;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod login;
pub mod session;
pub mod url_builder;

pub use actions::{BrowserActions, BrowserPage};
pub use classify::classify_response;
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result, SessionError, SessionResult};
pub use fetcher::{ChromeFetcher, FetchOutcome, PageFetcher};
pub use login::ChromeAuthenticator;
pub use session::{
    Authenticator, Interstitial, LoginOutcome, Session, SessionHandle, SessionId, SessionManager,
    SessionPolicy,
};
pub use url_builder::ReviewUrlBuilder;
