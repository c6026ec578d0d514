use rand::Rng;
use trustlens_core::BrowserConfig;

/// Desktop user agents a session may present.
const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Common desktop viewports.
const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

/// Fingerprint configuration for anti-detection
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Generate a randomized fingerprint configuration
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        let (width, height) = VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())];

        Self {
            user_agent: USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())].to_string(),
            viewport_width: width,
            viewport_height: height,
        }
    }

    /// Fingerprint honoring the configured user agent and window size.
    ///
    /// Only the user agent is randomized, and only when none is configured.
    pub fn from_config(config: &BrowserConfig) -> Self {
        let random = Self::randomized();
        Self {
            user_agent: config.user_agent.clone().unwrap_or(random.user_agent),
            viewport_width: config.window_width,
            viewport_height: config.window_height,
        }
    }
}
