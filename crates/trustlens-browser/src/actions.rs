use crate::engine::RateLimiter;
use crate::error::{BrowserError, Result};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use trustlens_auth::StoredCookie;

/// How often `wait_for_selector` re-queries the DOM.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser actions for automation
#[async_trait::async_trait]
pub trait BrowserActions {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Fill a form field by selector
    async fn fill_field(&self, selector: &str, value: &str) -> Result<()>;

    /// Click an element by selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Wait for a selector to appear
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Whether an element matching the selector is present right now
    async fn exists(&self, selector: &str) -> bool;

    /// Extract text from an element
    async fn extract_text(&self, selector: &str) -> Result<String>;

    /// Full page markup
    async fn content(&self) -> Result<String>;

    /// URL after redirects
    async fn current_url(&self) -> Result<String>;
}

/// One tab inside a session's isolated browser context.
pub struct BrowserPage {
    page: Page,
    pacer: Arc<Mutex<RateLimiter>>,
    navigation_timeout: Duration,
}

impl BrowserPage {
    pub(crate) fn new(
        page: Page,
        pacer: Arc<Mutex<RateLimiter>>,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            page,
            pacer,
            navigation_timeout,
        }
    }

    /// Cookies visible to the page's context.
    pub async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                // Chrome reports session cookies with a non-positive expiry
                expires: (c.expires > 0.0).then_some(c.expires),
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect())
    }

    /// Install cookies into the page's context.
    pub async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }

        let params: Vec<CookieParam> = cookies
            .iter()
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.domain = Some(c.domain.clone());
                param.path = Some(c.path.clone());
                param.secure = Some(c.secure);
                param.http_only = Some(c.http_only);
                param.expires = c.expires.map(TimeSinceEpoch::new);
                param
            })
            .collect();

        self.page
            .set_cookies(params)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    /// Close the tab.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            tracing::debug!("Page close error: {}", e);
        }
    }

    async fn find(&self, selector: &str) -> Result<chromiumoxide::Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let domain = extract_domain(url)?;
        let wait = self.pacer.lock().await.reserve(&domain, Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Pacing navigation to {} by {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))?
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
        Ok(())
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.find(selector).await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        element
            .type_str(value)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.find(selector)
            .await?
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.exists(selector).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!("waiting for {selector}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn exists(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }

    async fn extract_text(&self, selector: &str) -> Result<String> {
        let text = self
            .find(selector)
            .await?
            .inner_text()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(text.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {e}")))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(ToString::to_string)
}
