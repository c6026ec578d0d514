//! Exponential backoff with jitter for scrape retries.

use rand::Rng;
use std::time::Duration;
use trustlens_core::SchedulerConfig;

/// Delay policy between attempts for the same target.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    /// Create a policy. `jitter_ratio` is clamped to [0, 1].
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Policy from the `[scheduler]` config section.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.jitter_ratio,
        )
    }

    /// Delay before retry number `retry` (0 for the first retry) without
    /// jitter: `base * 2^retry`, capped.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(20));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Jittered delay before retry number `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.delay_with(retry, &mut rand::thread_rng())
    }

    /// Jittered delay drawing randomness from `rng`.
    pub fn delay_with<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(retry);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = rng.gen_range(-self.jitter_ratio..=self.jitter_ratio);
        delay.mul_f64(1.0 + spread).min(self.max)
    }
}
