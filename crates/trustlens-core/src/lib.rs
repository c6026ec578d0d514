//! Trustlens Core - Foundation crate for the Trustlens review-trust pipeline.
//!
//! This crate provides the shared domain types, error handling and
//! configuration management that every other Trustlens crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Validated identifiers (`ProductId`, `Marketplace`, `Target`)
//! - [`review`] - Parsed snapshots and trust assessments
//!
//! # Example
//!
//! ```rust
//! use trustlens_core::{AppConfig, Marketplace, Target};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let target = Target::parse_with_default("B0C1234XYZ", config.scraping.default_marketplace)?;
//! assert_eq!(target.marketplace(), Marketplace::Jp);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod review;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DatabaseConfig, SchedulerConfig, ScoringConfig, ScoringWeights,
    ScrapingConfig, SessionsConfig, VerdictThresholds,
};
pub use error::{ConfigError, ConfigResult, Result, TrustlensError};
pub use review::{
    Histogram, MetricKind, MetricReading, ReviewEntry, ReviewPageSnapshot, TrustAssessment,
    Verdict,
};
pub use types::{Marketplace, ProductId, Target};
