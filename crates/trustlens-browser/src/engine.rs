use crate::actions::BrowserPage;
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use trustlens_core::BrowserConfig;

/// Spaces out navigations per host.
///
/// Each call reserves the next free slot for the host and reports how long the
/// caller has to wait for it, so concurrent tabs queue up instead of failing.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    next_slot: HashMap<String, Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_delay_ms: u64) -> Self {
        Self {
            next_slot: HashMap::new(),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    pub(crate) fn reserve(&mut self, domain: &str, now: Instant) -> Duration {
        let slot = self
            .next_slot
            .get(domain)
            .copied()
            .filter(|slot| *slot > now)
            .unwrap_or(now);
        self.next_slot
            .insert(domain.to_string(), slot + self.min_delay);
        slot - now
    }
}

/// Browser automation engine
///
/// One Chrome process; every session slot gets its own incognito-style
/// browser context so cookies never leak between sessions.
pub struct BrowserEngine {
    browser: Browser,
    fingerprint: FingerprintConfig,
    contexts: Mutex<HashMap<usize, BrowserContextId>>,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    navigation_timeout: Duration,
}

impl BrowserEngine {
    /// Launch Chrome with the given settings.
    pub async fn launch(config: &BrowserConfig, min_request_interval_ms: u64) -> Result<Self> {
        let fingerprint = FingerprintConfig::from_config(config);
        let navigation_timeout = Duration::from_secs(config.navigation_timeout_secs);

        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .request_timeout(navigation_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        let chrome_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {}", e);
                }
            }
        });

        tracing::info!(
            "Browser launched (headless: {}, viewport {}x{})",
            config.headless,
            fingerprint.viewport_width,
            fingerprint.viewport_height
        );

        Ok(Self {
            browser,
            fingerprint,
            contexts: Mutex::new(HashMap::new()),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(min_request_interval_ms))),
            navigation_timeout,
        })
    }

    /// Open a blank tab in the context owned by `slot`, creating it if needed.
    pub async fn open_page(&self, slot: usize) -> Result<BrowserPage> {
        let context = self.context_for(slot).await?;

        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(context);
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        page.set_user_agent(self.fingerprint.user_agent.clone())
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        Ok(BrowserPage::new(
            page,
            Arc::clone(&self.rate_limiter),
            self.navigation_timeout,
        ))
    }

    /// Throw away the context owned by `slot`, dropping its cookies.
    pub async fn reset_context(&self, slot: usize) -> Result<()> {
        let Some(context) = self.contexts.lock().await.remove(&slot) else {
            return Ok(());
        };

        self.browser
            .execute(DisposeBrowserContextParams::new(context))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        tracing::debug!("Disposed browser context for session slot {}", slot);
        Ok(())
    }

    async fn context_for(&self, slot: usize) -> Result<BrowserContextId> {
        let mut contexts = self.contexts.lock().await;
        if let Some(context) = contexts.get(&slot) {
            return Ok(context.clone());
        }

        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        let context = created.result.browser_context_id;
        contexts.insert(slot, context.clone());
        tracing::debug!("Created browser context for session slot {}", slot);
        Ok(context)
    }
}
