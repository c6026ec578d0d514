//! Review page fetcher.
//!
//! A fetch never changes session state. It reports what it saw and leaves
//! the reaction (retry, re-login, retire) to the scheduler and the session
//! manager.

use crate::actions::{BrowserActions, BrowserPage};
use crate::classify::classify_response;
use crate::engine::BrowserEngine;
use crate::error::Result;
use crate::session::Session;
use crate::url_builder::ReviewUrlBuilder;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use trustlens_core::{ScrapingConfig, Target};

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Page loaded with normal content
    Success(String),
    /// Challenge, robot check or rate-limit page
    SoftBlock(String),
    /// Redirected to sign-in
    AuthRequired,
    /// Timeout, transport error or unusable response
    HardFailure(String),
}

impl FetchOutcome {
    /// Short stable name of the outcome kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::SoftBlock(_) => "soft_block",
            Self::AuthRequired => "auth_required",
            Self::HardFailure(_) => "hard_failure",
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(markup) => write!(f, "success ({} bytes)", markup.len()),
            Self::SoftBlock(reason) => write!(f, "soft block: {reason}"),
            Self::AuthRequired => write!(f, "authentication required"),
            Self::HardFailure(cause) => write!(f, "hard failure: {cause}"),
        }
    }
}

/// Retrieves one target's review page through a session.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch and classify the review page for `target`.
    async fn fetch(&self, target: &Target, session: &Session) -> FetchOutcome;
}

/// Fetcher backed by the shared Chrome engine.
pub struct ChromeFetcher {
    engine: Arc<BrowserEngine>,
    urls: ReviewUrlBuilder,
    timeout: Duration,
    settle_delay: Duration,
}

impl ChromeFetcher {
    /// Fetch through `engine` with the timeout and settle delay from `config`.
    pub fn new(engine: Arc<BrowserEngine>, config: &ScrapingConfig) -> Self {
        Self {
            engine,
            urls: ReviewUrlBuilder::new(config),
            timeout: Duration::from_secs(config.fetch_timeout_secs),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    async fn read(&self, page: &BrowserPage, url: &str) -> Result<(String, String)> {
        page.navigate(url).await?;
        tokio::time::sleep(self.settle_delay).await;
        let final_url = page.current_url().await?;
        let markup = page.content().await?;
        Ok((final_url, markup))
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, target: &Target, session: &Session) -> FetchOutcome {
        let url = self.urls.review_url(target);
        tracing::debug!("Fetching {} via {} ({})", target, session.id(), url);

        let page = match self.engine.open_page(session.id().slot()).await {
            Ok(page) => page,
            Err(e) => return FetchOutcome::HardFailure(e.to_string()),
        };
        let loaded = tokio::time::timeout(self.timeout, self.read(&page, &url)).await;
        page.close().await;

        let outcome = match loaded {
            Err(_) => FetchOutcome::HardFailure(format!("timed out after {:?}", self.timeout)),
            Ok(Err(e)) => FetchOutcome::HardFailure(e.to_string()),
            Ok(Ok((final_url, markup))) => classify_response(&final_url, &markup),
        };

        tracing::debug!("Fetch of {} finished: {}", target, outcome);
        outcome
    }
}
