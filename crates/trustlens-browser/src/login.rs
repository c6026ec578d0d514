//! Storefront login flow driven through Chrome.

use crate::actions::{BrowserActions, BrowserPage};
use crate::classify::is_challenge_url;
use crate::engine::BrowserEngine;
use crate::error::Result;
use crate::session::{Authenticator, Interstitial, LoginOutcome, Session};
use crate::url_builder::ReviewUrlBuilder;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use trustlens_auth::{Credentials, StorageState};
use trustlens_core::{ScrapingConfig, SessionsConfig};

const CONSENT_ACCEPT: &str = "#sp-cc-accept";
const LOGIN_LINK: &str = "a[data-nav-role='signin'], #nav-link-accountList a, a[href*='/ap/signin']";
const NAV_ACCOUNT_LINE: &str = "#nav-link-accountList-nav-line-1";
const EMAIL_FIELD: &str = "#ap_email_login, input#ap_email, input[name='email']";
const CONTINUE_BUTTON: &str = "#continue";
const PASSWORD_FIELD: &str = "input#ap_password";
const SIGN_IN_BUTTON: &str = "#signInSubmit";
const PASSKEY_BUTTON: &str = "#auth-signin-via-passkey-btn";
const OTP_FIELD: &str = "#auth-mfa-otpcode, input#cvf-input-code, input[name='otpCode'], input[name='code']";
const OTP_SUBMIT: &str = "#auth-signin-button, #cvf-submit-otp-button input[type='submit']";
const CAPTCHA: &str = "iframe[src*='captcha'], img[src*='captcha'], input[name='cvf_captcha_input']";
const ERROR_BOX: &str = "#auth-error-message-box";

/// How long each form step may take to render.
const STEP_TIMEOUT_MS: u64 = 10_000;

/// Account-line texts shown to signed-out visitors.
const SIGNED_OUT_MARKERS: [&str; 3] = ["sign in", "ログイン", "サインイン"];

/// Whether the account line in the navigation bar reads as signed out.
pub fn reads_signed_out(account_line: &str) -> bool {
    let text = account_line.to_lowercase();
    text.trim().is_empty() || SIGNED_OUT_MARKERS.iter().any(|m| text.contains(m))
}

/// Signs sessions in by filling the storefront login form.
pub struct ChromeAuthenticator {
    engine: Arc<BrowserEngine>,
    home_url: String,
    sign_in_url: Option<String>,
    settle: Duration,
}

impl ChromeAuthenticator {
    pub fn new(engine: Arc<BrowserEngine>, scraping: &ScrapingConfig, sessions: &SessionsConfig) -> Self {
        let urls = ReviewUrlBuilder::new(scraping);
        Self {
            engine,
            home_url: urls.home_url(scraping.default_marketplace),
            sign_in_url: sessions.sign_in_url.clone(),
            settle: Duration::from_millis(scraping.settle_delay_ms),
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(self.settle).await;
    }

    async fn is_logged_in(&self, page: &BrowserPage) -> bool {
        match page.extract_text(NAV_ACCOUNT_LINE).await {
            Ok(text) => !reads_signed_out(&text),
            Err(_) => false,
        }
    }

    async fn dismiss_consent(&self, page: &BrowserPage) {
        if page.exists(CONSENT_ACCEPT).await {
            if let Err(e) = page.click(CONSENT_ACCEPT).await {
                tracing::debug!("Cookie banner click failed: {}", e);
            }
        }
    }

    async fn open_home(&self, page: &BrowserPage) -> Result<()> {
        page.navigate(&self.home_url).await?;
        self.settle().await;
        self.dismiss_consent(page).await;
        Ok(())
    }

    async fn signed_in_state(&self, page: &BrowserPage) -> Result<LoginOutcome> {
        Ok(LoginOutcome::Authenticated(StorageState::new(page.cookies().await?)))
    }

    async fn restore_on(&self, page: &BrowserPage, state: &StorageState) -> Result<bool> {
        page.set_cookies(&state.cookies).await?;
        self.open_home(page).await?;
        Ok(self.is_logged_in(page).await)
    }

    async fn login_on(&self, page: &BrowserPage, credentials: &Credentials) -> Result<LoginOutcome> {
        self.open_home(page).await?;
        if self.is_logged_in(page).await {
            return self.signed_in_state(page).await;
        }

        match &self.sign_in_url {
            Some(url) => page.navigate(url).await?,
            None => {
                if page.click(LOGIN_LINK).await.is_err() {
                    return Ok(LoginOutcome::Rejected("login link not found".to_string()));
                }
            }
        }
        self.settle().await;

        if page.wait_for_selector(EMAIL_FIELD, STEP_TIMEOUT_MS).await.is_err() {
            return Ok(self.stuck(page, "email field not found").await);
        }
        page.fill_field(EMAIL_FIELD, credentials.email()).await?;
        if page.exists(CONTINUE_BUTTON).await {
            page.click(CONTINUE_BUTTON).await?;
            self.settle().await;
        }

        if page.wait_for_selector(PASSWORD_FIELD, STEP_TIMEOUT_MS).await.is_err() {
            if page.exists(PASSKEY_BUTTON).await {
                return Ok(LoginOutcome::Interstitial(Interstitial::Passkey));
            }
            return Ok(self.stuck(page, "password field not found").await);
        }
        page.fill_field(PASSWORD_FIELD, credentials.password()).await?;
        page.click(SIGN_IN_BUTTON).await?;
        self.settle().await;

        if page.exists(CAPTCHA).await {
            return Ok(LoginOutcome::Interstitial(Interstitial::Captcha));
        }
        if page.exists(OTP_FIELD).await {
            let Some(code) = credentials.otp() else {
                return Ok(LoginOutcome::Interstitial(Interstitial::Otp));
            };
            tracing::debug!("Submitting one-time code");
            page.fill_field(OTP_FIELD, code).await?;
            if page.exists(OTP_SUBMIT).await {
                page.click(OTP_SUBMIT).await?;
            }
            self.settle().await;
        }

        let landed = page.current_url().await?;
        if is_challenge_url(&landed) {
            return Ok(LoginOutcome::Interstitial(Interstitial::Challenge));
        }
        if page.exists(ERROR_BOX).await {
            let message = page.extract_text(ERROR_BOX).await.unwrap_or_default();
            return Ok(LoginOutcome::Rejected(format!(
                "sign-in refused: {}",
                message.split_whitespace().collect::<Vec<_>>().join(" ")
            )));
        }

        self.open_home(page).await?;
        if !self.is_logged_in(page).await {
            return Ok(LoginOutcome::Rejected(
                "still signed out after submitting the form".to_string(),
            ));
        }
        self.signed_in_state(page).await
    }

    /// Explain a form step that never rendered.
    async fn stuck(&self, page: &BrowserPage, fallback: &str) -> LoginOutcome {
        if page.exists(CAPTCHA).await {
            return LoginOutcome::Interstitial(Interstitial::Captcha);
        }
        if let Ok(url) = page.current_url().await {
            if is_challenge_url(&url) {
                return LoginOutcome::Interstitial(Interstitial::Challenge);
            }
        }
        LoginOutcome::Rejected(fallback.to_string())
    }
}

#[async_trait]
impl Authenticator for ChromeAuthenticator {
    async fn restore(&self, session: &Session, state: &StorageState) -> Result<bool> {
        let page = self.engine.open_page(session.id().slot()).await?;
        let restored = self.restore_on(&page, state).await;
        page.close().await;
        restored
    }

    async fn login(&self, session: &Session, credentials: &Credentials) -> Result<LoginOutcome> {
        let page = self.engine.open_page(session.id().slot()).await?;
        let outcome = self.login_on(&page, credentials).await;
        page.close().await;
        outcome
    }

    async fn capture(&self, session: &Session) -> Result<StorageState> {
        let page = self.engine.open_page(session.id().slot()).await?;
        let cookies = page.cookies().await;
        page.close().await;
        Ok(StorageState::new(cookies?))
    }

    async fn discard(&self, session: &Session) -> Result<()> {
        self.engine.reset_context(session.id().slot()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_line_detection() {
        assert!(reads_signed_out("Hello, sign in"));
        assert!(reads_signed_out("こんにちは, ログイン"));
        assert!(reads_signed_out("   "));
        assert!(!reads_signed_out("Hello, Taro"));
    }
}
