//! Review data model: parsed page snapshots and trust assessments.
//!
//! A [`ReviewPageSnapshot`] is what the markup parser produces from one review
//! page; a [`TrustAssessment`] is what the scorer derives from a snapshot.
//! Both are immutable once produced.

use crate::error::TrustlensError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One parsed review block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Star rating, 1 to 5
    pub rating: u8,
    /// Whether the review carries a verified-purchase badge
    pub verified: bool,
    /// Length of the review body in characters
    pub text_length: usize,
    /// Number of readers who marked the review helpful, if shown
    pub helpful_votes: Option<u32>,
    /// Date the review was posted, best effort
    pub reviewed_on: Option<NaiveDate>,
    /// Reviewer display name; `None` when hidden or a site placeholder
    #[serde(default)]
    pub author: Option<String>,
    /// Hex SHA-256 of the case- and whitespace-folded body
    #[serde(default)]
    pub body_digest: Option<String>,
    /// Body contains complaint wording
    #[serde(default)]
    pub negative_wording: bool,
}

/// Star-rating histogram: review counts for ratings 1 through 5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram([u64; 5]);

impl Histogram {
    /// Build a histogram from counts ordered 1-star to 5-star.
    #[must_use]
    pub fn from_counts(counts: [u64; 5]) -> Self {
        Self(counts)
    }

    /// Tally the ratings of parsed entries. Out-of-range ratings are ignored.
    #[must_use]
    pub fn tally(entries: &[ReviewEntry]) -> Self {
        let mut counts = [0u64; 5];
        for entry in entries {
            if (1..=5).contains(&entry.rating) {
                counts[usize::from(entry.rating - 1)] += 1;
            }
        }
        Self(counts)
    }

    /// Count for a star rating (1-5). Returns 0 for anything else.
    #[must_use]
    pub fn count(&self, stars: u8) -> u64 {
        match stars {
            1..=5 => self.0[usize::from(stars - 1)],
            _ => 0,
        }
    }

    /// Counts ordered 1-star to 5-star.
    #[must_use]
    pub fn counts(&self) -> [u64; 5] {
        self.0
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Share of reviews with the given rating, or `None` for an empty histogram.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn share(&self, stars: u8) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.count(stars) as f64 / total as f64)
    }
}

/// Structured content of one review page.
///
/// The histogram sum is always at least the number of parsed entries: the
/// page-level aggregate covers every review while only one page of entries is
/// visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPageSnapshot {
    histogram: Histogram,
    entries: Vec<ReviewEntry>,
    total_reviews: u64,
    captured_at: DateTime<Utc>,
    approximate: bool,
    average_rating: Option<f64>,
    title: Option<String>,
}

impl ReviewPageSnapshot {
    /// Create a snapshot.
    ///
    /// `total_reviews` is the page's reported review count when known; it is
    /// raised to the histogram sum if smaller.
    ///
    /// # Errors
    /// Returns error if the histogram accounts for fewer reviews than `entries`.
    pub fn new(
        histogram: Histogram,
        entries: Vec<ReviewEntry>,
        total_reviews: Option<u64>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, TrustlensError> {
        let histogram_total = histogram.total();
        if histogram_total < entries.len() as u64 {
            return Err(TrustlensError::Validation(format!(
                "histogram counts {histogram_total} reviews but {} entries were parsed",
                entries.len()
            )));
        }

        Ok(Self {
            histogram,
            entries,
            total_reviews: total_reviews.unwrap_or(0).max(histogram_total),
            captured_at,
            approximate: false,
            average_rating: None,
            title: None,
        })
    }

    /// Mark the histogram as reconstructed from visible entries.
    #[must_use]
    pub fn with_approximate(mut self, approximate: bool) -> Self {
        self.approximate = approximate;
        self
    }

    /// Attach the page's displayed average rating.
    #[must_use]
    pub fn with_average_rating(mut self, average: Option<f64>) -> Self {
        self.average_rating = average;
        self
    }

    /// Attach the product title.
    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Star-rating histogram.
    #[must_use]
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Parsed review entries in page order.
    #[must_use]
    pub fn entries(&self) -> &[ReviewEntry] {
        &self.entries
    }

    /// Total number of reviews for the product.
    #[must_use]
    pub fn total_reviews(&self) -> u64 {
        self.total_reviews
    }

    /// When the page was captured.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Whether the histogram was tallied from visible entries instead of read
    /// from the page's rating widget.
    #[must_use]
    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// Displayed average rating, if present.
    #[must_use]
    pub fn average_rating(&self) -> Option<f64> {
        self.average_rating
    }

    /// Product title, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

/// Categorical outcome of a trust assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Review distribution looks organic
    Trusted,
    /// Mixed signals or not enough data
    Caution,
    /// Review distribution looks manipulated
    Suspicious,
}

impl Verdict {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::Caution => "caution",
            Self::Suspicious => "suspicious",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named sub-metrics combined into a trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Excess five-star share over an organic baseline
    DistributionSkew,
    /// Fraction of verified-purchase reviews
    VerifiedRatio,
    /// Review-count growth rate against history
    VelocityAnomaly,
    /// Share of very short review texts
    TextThinness,
    /// Share of reviews repeating another review's body
    DuplicateText,
    /// Reviews posted under a name already seen on the page
    RepeatedAuthors,
    /// High ratings whose text reads as a complaint
    RatingTextMismatch,
}

impl MetricKind {
    /// All metrics in evaluation order.
    pub const ALL: [MetricKind; 7] = [
        Self::DistributionSkew,
        Self::VerifiedRatio,
        Self::VelocityAnomaly,
        Self::TextThinness,
        Self::DuplicateText,
        Self::RepeatedAuthors,
        Self::RatingTextMismatch,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DistributionSkew => "distribution_skew",
            Self::VerifiedRatio => "verified_ratio",
            Self::VelocityAnomaly => "velocity_anomaly",
            Self::TextThinness => "text_thinness",
            Self::DuplicateText => "duplicate_text",
            Self::RepeatedAuthors => "repeated_authors",
            Self::RatingTextMismatch => "rating_text_mismatch",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One sub-metric's reading within an assessment.
///
/// `trust` is the metric normalized to [0, 1] where 1 is fully trustworthy;
/// `contribution` is its weighted share of the final score after
/// renormalizing over the metrics that could be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricReading {
    /// Computed from the snapshot (and history, for velocity)
    Measured {
        /// Normalized trust value
        trust: f64,
        /// Configured weight
        weight: f64,
        /// Weighted contribution to the score
        contribution: f64,
    },
    /// No evidence either way; contributes a neutral midpoint
    Neutral {
        /// Neutral trust value
        trust: f64,
        /// Configured weight
        weight: f64,
        /// Weighted contribution to the score
        contribution: f64,
    },
    /// Not enough data to compute; excluded from the score
    InsufficientData {
        /// Configured weight
        weight: f64,
    },
}

impl MetricReading {
    /// Normalized trust value, if the metric produced one.
    #[must_use]
    pub fn trust(&self) -> Option<f64> {
        match self {
            Self::Measured { trust, .. } | Self::Neutral { trust, .. } => Some(*trust),
            Self::InsufficientData { .. } => None,
        }
    }

    /// Weighted contribution to the final score (0 when insufficient).
    #[must_use]
    pub fn contribution(&self) -> f64 {
        match self {
            Self::Measured { contribution, .. } | Self::Neutral { contribution, .. } => {
                *contribution
            }
            Self::InsufficientData { .. } => 0.0,
        }
    }
}

/// Trust score for one snapshot with per-metric explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Score in [0.0, 1.0]
    pub score: f64,
    /// Sub-metric readings
    pub metrics: BTreeMap<MetricKind, MetricReading>,
    /// Categorical verdict
    pub verdict: Verdict,
}
