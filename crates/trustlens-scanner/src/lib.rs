//! Trustlens Scanner - review scraping pipeline.
//!
//! This crate turns product targets into trust assessments. Each target runs
//! through fetch, parse and score on a bounded worker pool that draws signed-in
//! sessions from the browser crate's session manager.
//!
//! # Features
//!
//! - Markup parsing with ordered selector fallbacks for English and Japanese layouts
//! - Weighted trust scoring with per-metric explanation
//! - Per-target deduplication of concurrent submissions
//! - Retry with exponential backoff and jitter for soft blocks and expired sessions
//! - Bounded queue that fails fast when overloaded
//!
//! # Example
//!
//! ```rust,ignore
//! use trustlens_scanner::{ScrapeScheduler, SchedulerSettings, TrustScorer};
//! use std::sync::Arc;
//!
//! let scheduler = ScrapeScheduler::new(
//!     sessions,
//!     Arc::new(fetcher),
//!     Arc::new(archive),
//!     TrustScorer::new(config.scoring.clone()),
//!     SchedulerSettings::from_config(&config),
//! );
//!
//! let assessment = scheduler.submit("JP:B0C1234XYZ".parse()?).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod backoff;
pub mod error;
pub mod parser;
pub mod scheduler;
pub mod scorer;

pub use backoff::BackoffPolicy;
pub use error::{LastOutcome, Result, ScrapeError};
pub use parser::{parse, parse_captured_at, ParseError};
pub use scheduler::{SchedulerSettings, ScrapeScheduler, ScrapeTicket};
pub use scorer::TrustScorer;
