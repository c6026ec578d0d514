//! Credential collaborator boundary.
//!
//! Credentials are pulled on demand and held in zeroizing buffers. Nothing in
//! this crate logs or persists them; only the masked login identity is ever
//! printed.

use crate::error::{AuthError, Result};
use std::fmt;
use zeroize::Zeroizing;

/// Environment variable holding the login email.
pub const ENV_EMAIL: &str = "TRUSTLENS_LOGIN_EMAIL";
/// Environment variable holding the login password.
pub const ENV_PASSWORD: &str = "TRUSTLENS_LOGIN_PASSWORD";
/// Environment variable holding an optional one-time code.
pub const ENV_OTP: &str = "TRUSTLENS_LOGIN_OTP";

/// Login credentials for the source site.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: Zeroizing<String>,
    otp: Option<Zeroizing<String>>,
}

impl Credentials {
    /// Create credentials without a one-time code.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Zeroizing::new(password.into()),
            otp: None,
        }
    }

    /// Attach a one-time code for sites that ask for one.
    #[must_use]
    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(Zeroizing::new(otp.into()));
        self
    }

    /// Login email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Login password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// One-time code, if supplied.
    #[must_use]
    pub fn otp(&self) -> Option<&str> {
        self.otp.as_deref().map(String::as_str)
    }

    /// Email safe to log, e.g. `j***@example.com`.
    #[must_use]
    pub fn masked_email(&self) -> String {
        mask_email(&self.email)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.masked_email())
            .field("password", &"***")
            .field("otp", &self.otp.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Mask the local part of an email address, keeping its first character.
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

/// Supplies login credentials to the session manager on demand.
pub trait CredentialProvider: Send + Sync {
    /// Resolve the current credentials.
    fn credentials(&self) -> Result<Credentials>;
}

/// Reads credentials from `TRUSTLENS_LOGIN_EMAIL`, `TRUSTLENS_LOGIN_PASSWORD`
/// and the optional `TRUSTLENS_LOGIN_OTP`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    /// Create an environment-backed provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Result<Credentials> {
        let email = non_blank_env(ENV_EMAIL)
            .ok_or_else(|| AuthError::MissingCredentials(format!("{ENV_EMAIL} is not set")))?;
        let password = non_blank_env(ENV_PASSWORD)
            .ok_or_else(|| AuthError::MissingCredentials(format!("{ENV_PASSWORD} is not set")))?;

        let credentials = Credentials::new(email, password);
        Ok(match non_blank_env(ENV_OTP) {
            Some(otp) => credentials.with_otp(otp),
            None => credentials,
        })
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Provider returning fixed credentials, for tests and embedding.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    /// Wrap fixed credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}
