//! Configuration management for Trustlens.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Credentials are never read from here;
//! they come from the credential provider.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Marketplace;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/trustlens/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Review page addressing and fetch timing
    pub scraping: ScrapingConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Session pool settings
    pub sessions: SessionsConfig,
    /// Queueing and retry policy
    pub scheduler: SchedulerConfig,
    /// Trust score weights and thresholds
    pub scoring: ScoringConfig,
    /// Snapshot archive settings
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides in place.
    ///
    /// Supports the following environment variables:
    /// - `TRUSTLENS_HEADLESS`: Override browser headless mode (true/false)
    /// - `TRUSTLENS_POOL_SIZE`: Override the session pool size
    /// - `TRUSTLENS_QUEUE_DEPTH`: Override the scheduler queue depth
    /// - `TRUSTLENS_STATE_DIR`: Override the session storage-state directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TRUSTLENS_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("TRUSTLENS_POOL_SIZE") {
            if let Ok(size) = val.parse() {
                self.sessions.pool_size = size;
                tracing::debug!("Override sessions.pool_size from env: {}", size);
            }
        }

        if let Ok(val) = std::env::var("TRUSTLENS_QUEUE_DEPTH") {
            if let Ok(depth) = val.parse() {
                self.scheduler.queue_depth = depth;
                tracing::debug!("Override scheduler.queue_depth from env: {}", depth);
            }
        }

        if let Ok(val) = std::env::var("TRUSTLENS_STATE_DIR") {
            if !val.is_empty() {
                tracing::debug!("Override sessions.state_dir from env: {}", val);
                self.sessions.state_dir = PathBuf::from(val);
            }
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sessions.pool_size == 0 {
            return Err(invalid("sessions.pool_size", "must be at least 1"));
        }
        if self.scheduler.queue_depth == 0 {
            return Err(invalid("scheduler.queue_depth", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.scheduler.jitter_ratio) {
            return Err(invalid("scheduler.jitter_ratio", "must be within [0, 1]"));
        }
        self.scoring.validate()
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/trustlens/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "trustlens", "trustlens").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Review page addressing and fetch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Marketplace for targets given as a bare product ID
    pub default_marketplace: Marketplace,
    /// Base URL overrides keyed by marketplace code (e.g. `jp = "https://..."`)
    pub base_urls: BTreeMap<String, String>,
    /// Timeout for one fetch attempt in seconds
    pub fetch_timeout_secs: u64,
    /// Delay after navigation before reading the page, in milliseconds
    pub settle_delay_ms: u64,
    /// Minimum spacing between navigations to the same host, in milliseconds
    pub min_request_interval_ms: u64,
}

impl ScrapingConfig {
    /// Base URL for a marketplace, honoring overrides.
    #[must_use]
    pub fn base_url(&self, marketplace: Marketplace) -> String {
        self.base_urls
            .get(marketplace.code())
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| marketplace.default_base_url())
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            default_marketplace: Marketplace::Jp,
            base_urls: BTreeMap::new(),
            fetch_timeout_secs: 45,
            settle_delay_ms: 1_500,
            min_request_interval_ms: 1_000,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Whether to run Chrome headless
    pub headless: bool,
    /// Viewport width in pixels
    pub window_width: u32,
    /// Viewport height in pixels
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Fixed user agent; a randomized fingerprint is used when unset
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1366,
            window_height: 900,
            navigation_timeout_secs: 30,
            user_agent: None,
        }
    }
}

/// Session pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Number of browser sessions, which is also the scrape worker count
    pub pool_size: usize,
    /// Directory holding one storage-state file per session slot
    pub state_dir: PathBuf,
    /// Failed re-logins tolerated before a session is blocked
    pub max_reauth_attempts: u32,
    /// Consecutive soft blocks after which a session is retired
    pub soft_block_threshold: u32,
    /// Sign-in page URL; when unset the login link on the storefront is used
    pub sign_in_url: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            state_dir: PathBuf::from("var/sessions"),
            max_reauth_attempts: 2,
            soft_block_threshold: 5,
            sign_in_url: None,
        }
    }
}

/// Queueing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Submissions allowed to wait for a worker before new ones are rejected
    pub queue_depth: usize,
    /// Retries for soft blocks and auth-required outcomes
    pub max_retries: u32,
    /// Retries for hard failures
    pub max_hard_failure_retries: u32,
    /// First backoff delay in milliseconds
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds
    pub backoff_max_ms: u64,
    /// Random jitter as a fraction of the delay, within [0, 1]
    pub jitter_ratio: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            max_retries: 3,
            max_hard_failure_retries: 1,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
            jitter_ratio: 0.25,
        }
    }
}

/// Sub-metric weights. Normalized over the metrics that can be computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Five-star skew weight
    pub distribution_skew: f64,
    /// Verified-purchase ratio weight
    pub verified_ratio: f64,
    /// Review velocity weight
    pub velocity: f64,
    /// Short-text share weight
    pub text_thinness: f64,
    /// Duplicate-body weight; reported but not scored by default
    pub duplicate_text: f64,
    /// Repeated-author weight; reported but not scored by default
    pub repeated_authors: f64,
    /// Rating/text mismatch weight; reported but not scored by default
    pub rating_mismatch: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distribution_skew: 0.35,
            verified_ratio: 0.25,
            velocity: 0.15,
            text_thinness: 0.25,
            duplicate_text: 0.0,
            repeated_authors: 0.0,
            rating_mismatch: 0.0,
        }
    }
}

/// Score cut-offs for verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    /// Minimum score for `Trusted`
    pub trusted: f64,
    /// Minimum score for `Caution`; anything lower is `Suspicious`
    pub caution: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            trusted: 0.70,
            caution: 0.40,
        }
    }
}

/// Trust score weights, thresholds and metric calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Sub-metric weights
    pub weights: ScoringWeights,
    /// Verdict thresholds
    pub thresholds: VerdictThresholds,
    /// Five-star share considered organic; skew grows above it
    pub five_star_baseline: f64,
    /// Verified-purchase ratio at which the metric reaches full trust
    pub verified_target: f64,
    /// Reviews with at most this many characters count as thin
    pub short_text_chars: usize,
    /// Growth-rate multiple over the historical rate at which velocity trust hits 0
    pub velocity_spike_ceiling: f64,
    /// Floor for the historical growth rate, in reviews per day
    pub velocity_baseline_per_day: f64,
    /// Score reported for snapshots with zero reviews
    pub zero_review_score: f64,
}

impl ScoringConfig {
    /// Reject weights and thresholds the scorer cannot use.
    pub fn validate(&self) -> ConfigResult<()> {
        let w = &self.weights;
        let weights = [
            w.distribution_skew,
            w.verified_ratio,
            w.velocity,
            w.text_thinness,
            w.duplicate_text,
            w.repeated_authors,
            w.rating_mismatch,
        ];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid(
                "scoring.weights",
                "weights must be finite and non-negative",
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("scoring.weights", "all weights are zero"));
        }

        let t = &self.thresholds;
        if !(0.0 <= t.caution && t.caution <= t.trusted && t.trusted <= 1.0) {
            return Err(invalid(
                "scoring.thresholds",
                "expected 0 <= caution <= trusted <= 1",
            ));
        }
        if !(0.0..1.0).contains(&self.five_star_baseline) {
            return Err(invalid("scoring.five_star_baseline", "must be within [0, 1)"));
        }
        if !(self.verified_target > 0.0 && self.verified_target <= 1.0) {
            return Err(invalid("scoring.verified_target", "must be within (0, 1]"));
        }
        if self.velocity_spike_ceiling <= 1.0 {
            return Err(invalid(
                "scoring.velocity_spike_ceiling",
                "must be greater than 1",
            ));
        }
        if self.velocity_baseline_per_day <= 0.0 {
            return Err(invalid(
                "scoring.velocity_baseline_per_day",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.zero_review_score) {
            return Err(invalid("scoring.zero_review_score", "must be within [0, 1]"));
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            thresholds: VerdictThresholds::default(),
            five_star_baseline: 0.40,
            verified_target: 0.80,
            short_text_chars: 30,
            velocity_spike_ceiling: 5.0,
            velocity_baseline_per_day: 1.0,
            zero_review_score: 0.45,
        }
    }
}

/// Snapshot archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; snapshots are kept in memory when unset
    pub path: Option<PathBuf>,
    /// Maximum number of prior snapshots loaded as scoring history
    pub history_limit: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_limit: 30,
        }
    }
}
