//! Trust scoring.
//!
//! Sub-metrics, each normalized so 1.0 means fully trustworthy, are
//! combined as a weighted average over the metrics that could be computed.
//! Weights, thresholds and metric constants all come from [`ScoringConfig`].
//!
//! The text signals (duplicate bodies, repeated authors, rating/text
//! mismatch) are always reported; they only move the score when given a
//! non-zero weight.

use std::collections::{BTreeMap, HashSet};
use trustlens_core::{
    MetricKind, MetricReading, ReviewPageSnapshot, ScoringConfig, TrustAssessment, Verdict,
};

/// Trust value for a metric with no evidence either way.
const NEUTRAL_TRUST: f64 = 0.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Computes a [`TrustAssessment`] from a snapshot and its history.
#[derive(Debug, Clone, Default)]
pub struct TrustScorer {
    config: ScoringConfig,
}

/// Raw per-metric result before weighting.
#[derive(Debug, Clone, Copy)]
enum Raw {
    Measured(f64),
    Neutral,
    Insufficient,
}

impl TrustScorer {
    /// Create a scorer with the given weights and thresholds.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `snapshot`. `history` holds earlier snapshots of the same target,
    /// oldest first.
    ///
    /// Deterministic and always within [0, 1]. A snapshot with zero reviews
    /// scores `zero_review_score` with verdict `Caution` and every metric
    /// reported as insufficient data.
    #[must_use]
    pub fn score(
        &self,
        snapshot: &ReviewPageSnapshot,
        history: &[ReviewPageSnapshot],
    ) -> TrustAssessment {
        if snapshot.total_reviews() == 0 {
            let metrics = MetricKind::ALL
                .iter()
                .map(|kind| {
                    (
                        *kind,
                        MetricReading::InsufficientData {
                            weight: self.weight(*kind),
                        },
                    )
                })
                .collect();
            return TrustAssessment {
                score: self.config.zero_review_score.clamp(0.0, 1.0),
                metrics,
                verdict: Verdict::Caution,
            };
        }

        let raw: Vec<(MetricKind, Raw)> = MetricKind::ALL
            .iter()
            .map(|kind| {
                let value = match kind {
                    MetricKind::DistributionSkew => self.distribution_skew(snapshot),
                    MetricKind::VerifiedRatio => self.verified_ratio(snapshot),
                    MetricKind::VelocityAnomaly => self.velocity(snapshot, history),
                    MetricKind::TextThinness => self.text_thinness(snapshot),
                    MetricKind::DuplicateText => duplicate_text(snapshot),
                    MetricKind::RepeatedAuthors => repeated_authors(snapshot),
                    MetricKind::RatingTextMismatch => rating_text_mismatch(snapshot),
                };
                (*kind, value)
            })
            .collect();

        let active_weight: f64 = raw
            .iter()
            .filter(|(_, value)| !matches!(value, Raw::Insufficient))
            .map(|(kind, _)| self.weight(*kind))
            .sum();

        let mut metrics = BTreeMap::new();
        let mut score = 0.0;
        for (kind, value) in raw {
            let weight = self.weight(kind);
            let share = if active_weight > 0.0 {
                weight / active_weight
            } else {
                0.0
            };
            let reading = match value {
                Raw::Measured(trust) => {
                    let contribution = share * trust;
                    score += contribution;
                    MetricReading::Measured {
                        trust,
                        weight,
                        contribution,
                    }
                }
                Raw::Neutral => {
                    let contribution = share * NEUTRAL_TRUST;
                    score += contribution;
                    MetricReading::Neutral {
                        trust: NEUTRAL_TRUST,
                        weight,
                        contribution,
                    }
                }
                Raw::Insufficient => MetricReading::InsufficientData { weight },
            };
            metrics.insert(kind, reading);
        }

        if active_weight <= 0.0 || !score.is_finite() {
            score = self.config.zero_review_score;
        }
        let score = score.clamp(0.0, 1.0);

        TrustAssessment {
            score,
            verdict: self.verdict(score),
            metrics,
        }
    }

    /// Map a score onto a verdict using the configured thresholds.
    #[must_use]
    pub fn verdict(&self, score: f64) -> Verdict {
        let thresholds = &self.config.thresholds;
        if score >= thresholds.trusted {
            Verdict::Trusted
        } else if score >= thresholds.caution {
            Verdict::Caution
        } else {
            Verdict::Suspicious
        }
    }

    fn weight(&self, kind: MetricKind) -> f64 {
        let weights = &self.config.weights;
        match kind {
            MetricKind::DistributionSkew => weights.distribution_skew,
            MetricKind::VerifiedRatio => weights.verified_ratio,
            MetricKind::VelocityAnomaly => weights.velocity,
            MetricKind::TextThinness => weights.text_thinness,
            MetricKind::DuplicateText => weights.duplicate_text,
            MetricKind::RepeatedAuthors => weights.repeated_authors,
            MetricKind::RatingTextMismatch => weights.rating_mismatch,
        }
    }

    /// Excess five-star share over the organic baseline.
    fn distribution_skew(&self, snapshot: &ReviewPageSnapshot) -> Raw {
        let Some(five_star) = snapshot.histogram().share(5) else {
            return Raw::Insufficient;
        };
        let baseline = self.config.five_star_baseline;
        let headroom = 1.0 - baseline;
        if headroom <= 0.0 {
            return Raw::Neutral;
        }
        let excess = ((five_star - baseline) / headroom).clamp(0.0, 1.0);
        Raw::Measured(1.0 - excess)
    }

    #[allow(clippy::cast_precision_loss)]
    fn verified_ratio(&self, snapshot: &ReviewPageSnapshot) -> Raw {
        let entries = snapshot.entries();
        if entries.is_empty() {
            return Raw::Insufficient;
        }
        let verified = entries.iter().filter(|e| e.verified).count() as f64;
        let ratio = verified / entries.len() as f64;
        let target = self.config.verified_target;
        if target <= 0.0 {
            return Raw::Measured(1.0);
        }
        Raw::Measured((ratio / target).min(1.0))
    }

    #[allow(clippy::cast_precision_loss)]
    fn text_thinness(&self, snapshot: &ReviewPageSnapshot) -> Raw {
        let entries = snapshot.entries();
        if entries.is_empty() {
            return Raw::Insufficient;
        }
        let short = entries
            .iter()
            .filter(|e| e.text_length <= self.config.short_text_chars)
            .count() as f64;
        Raw::Measured(1.0 - short / entries.len() as f64)
    }

    /// Review growth since the previous capture against the usual growth.
    fn velocity(&self, snapshot: &ReviewPageSnapshot, history: &[ReviewPageSnapshot]) -> Raw {
        let earlier: Vec<&ReviewPageSnapshot> = history
            .iter()
            .filter(|h| h.captured_at() < snapshot.captured_at())
            .collect();
        let Some(previous) = earlier.last() else {
            return Raw::Neutral;
        };
        let Some(current_rate) = growth_per_day(previous, snapshot) else {
            return Raw::Neutral;
        };

        let past_rates: Vec<f64> = earlier
            .windows(2)
            .filter_map(|pair| growth_per_day(pair[0], pair[1]))
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let historical = if past_rates.is_empty() {
            0.0
        } else {
            past_rates.iter().sum::<f64>() / past_rates.len() as f64
        };

        let baseline = self.config.velocity_baseline_per_day.max(historical);
        if baseline <= 0.0 {
            return Raw::Neutral;
        }
        let spike = current_rate / baseline;
        let ceiling = self.config.velocity_spike_ceiling;
        if spike <= 1.0 {
            return Raw::Measured(1.0);
        }
        if ceiling <= 1.0 {
            return Raw::Measured(0.0);
        }
        Raw::Measured(1.0 - ((spike - 1.0) / (ceiling - 1.0)).clamp(0.0, 1.0))
    }
}

/// Share of values that repeat one seen earlier; needs at least two values.
#[allow(clippy::cast_precision_loss)]
fn repeat_trust<'a>(values: impl Iterator<Item = &'a str>) -> Raw {
    let values: Vec<&str> = values.collect();
    if values.len() < 2 {
        return Raw::Insufficient;
    }
    let distinct: HashSet<&str> = values.iter().copied().collect();
    let repeats = (values.len() - distinct.len()) as f64;
    Raw::Measured(1.0 - repeats / values.len() as f64)
}

fn duplicate_text(snapshot: &ReviewPageSnapshot) -> Raw {
    repeat_trust(snapshot.entries().iter().filter_map(|e| e.body_digest.as_deref()))
}

fn repeated_authors(snapshot: &ReviewPageSnapshot) -> Raw {
    repeat_trust(snapshot.entries().iter().filter_map(|e| e.author.as_deref()))
}

/// Four- and five-star reviews whose body reads as a complaint.
#[allow(clippy::cast_precision_loss)]
fn rating_text_mismatch(snapshot: &ReviewPageSnapshot) -> Raw {
    let high: Vec<_> = snapshot.entries().iter().filter(|e| e.rating >= 4).collect();
    if high.is_empty() {
        return Raw::Insufficient;
    }
    let mismatched = high.iter().filter(|e| e.negative_wording).count() as f64;
    Raw::Measured(1.0 - mismatched / high.len() as f64)
}

/// New reviews per day between two captures, or `None` when no time passed.
#[allow(clippy::cast_precision_loss)]
fn growth_per_day(earlier: &ReviewPageSnapshot, later: &ReviewPageSnapshot) -> Option<f64> {
    let elapsed = (later.captured_at() - earlier.captured_at()).num_seconds() as f64 / SECONDS_PER_DAY;
    if elapsed <= 0.0 {
        return None;
    }
    let added = later.total_reviews().saturating_sub(earlier.total_reviews()) as f64;
    Some(added / elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use trustlens_core::{Histogram, ReviewEntry, ScoringWeights, VerdictThresholds};

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp")
            + Duration::days(day)
    }

    fn entries(count: usize, verified: usize, short: usize) -> Vec<ReviewEntry> {
        (0..count)
            .map(|i| ReviewEntry {
                rating: 5,
                verified: i < verified,
                text_length: if i < short { 8 } else { 240 },
                helpful_votes: None,
                reviewed_on: None,
                author: Some(format!("reviewer-{i}")),
                body_digest: Some(format!("{i:064x}")),
                negative_wording: false,
            })
            .collect()
    }

    fn snapshot(counts: [u64; 5], entries: Vec<ReviewEntry>, day: i64) -> ReviewPageSnapshot {
        ReviewPageSnapshot::new(Histogram::from_counts(counts), entries, None, at(day))
            .expect("valid snapshot")
    }

    #[test]
    fn test_skewed_thin_unverified_is_suspicious() {
        let snap = snapshot([12, 1, 2, 5, 80], entries(10, 2, 9), 0);
        let assessment = TrustScorer::default().score(&snap, &[]);

        assert_eq!(assessment.verdict, Verdict::Suspicious);
        assert!(assessment.score < 0.4, "score {}", assessment.score);
        assert!(matches!(
            assessment.metrics[&MetricKind::VelocityAnomaly],
            MetricReading::Neutral { .. }
        ));
        let total: f64 = assessment.metrics.values().map(MetricReading::contribution).sum();
        assert!((total - assessment.score).abs() < 1e-9);
    }

    #[test]
    fn test_organic_profile_is_trusted() {
        let snap = snapshot([5, 5, 10, 30, 50], entries(10, 9, 1), 0);
        let assessment = TrustScorer::default().score(&snap, &[]);
        assert_eq!(assessment.verdict, Verdict::Trusted);
    }

    #[test]
    fn test_zero_reviews_is_caution() {
        let snap = snapshot([0; 5], vec![], 0);
        let assessment = TrustScorer::default().score(&snap, &[]);

        assert_eq!(assessment.verdict, Verdict::Caution);
        assert!((0.0..=1.0).contains(&assessment.score));
        assert!(assessment
            .metrics
            .values()
            .all(|m| matches!(m, MetricReading::InsufficientData { .. })));
    }

    #[test]
    fn test_score_is_bounded() {
        let scorer = TrustScorer::default();
        for five in [0u64, 1, 50, 1000] {
            for one in [0u64, 3, 900] {
                let snap = snapshot([one, 0, 0, 0, five], vec![], 0);
                let score = scorer.score(&snap, &[]).score;
                assert!((0.0..=1.0).contains(&score), "score {score}");
            }
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let history = vec![snapshot([1, 1, 1, 1, 6], vec![], 0)];
        let snap = snapshot([2, 1, 1, 3, 40], entries(5, 3, 2), 3);
        let scorer = TrustScorer::default();
        assert_eq!(scorer.score(&snap, &history), scorer.score(&snap, &history));
    }

    #[test]
    fn test_velocity_spike_lowers_trust() {
        let scorer = TrustScorer::default();
        let history = vec![
            snapshot([1, 1, 1, 1, 6], vec![], 0),
            snapshot([1, 1, 1, 1, 8], vec![], 2),
        ];

        let steady = snapshot([1, 1, 1, 1, 9], vec![], 3);
        let spike = snapshot([1, 1, 1, 1, 108], vec![], 4);

        let steady_trust = scorer.score(&steady, &history).metrics[&MetricKind::VelocityAnomaly].trust();
        let spike_trust = scorer.score(&spike, &history).metrics[&MetricKind::VelocityAnomaly].trust();
        assert_eq!(steady_trust, Some(1.0));
        assert_eq!(spike_trust, Some(0.0));
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let snap = snapshot([5, 5, 10, 30, 50], entries(10, 9, 1), 0);
        let strict = TrustScorer::new(ScoringConfig {
            thresholds: VerdictThresholds {
                trusted: 0.99,
                caution: 0.95,
            },
            ..ScoringConfig::default()
        });
        assert_eq!(strict.score(&snap, &[]).verdict, Verdict::Suspicious);
    }

    #[test]
    fn test_insufficient_metrics_are_renormalized() {
        let snap = snapshot([0, 0, 0, 0, 10], vec![], 0);
        let assessment = TrustScorer::default().score(&snap, &[]);
        let skew = &assessment.metrics[&MetricKind::DistributionSkew];
        assert_eq!(skew.trust(), Some(0.0));
        assert!(matches!(
            assessment.metrics[&MetricKind::VerifiedRatio],
            MetricReading::InsufficientData { .. }
        ));
        // skew 0.0 at weight 0.35 and neutral velocity 0.5 at weight 0.15
        assert!((assessment.score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_text_signals_are_reported_without_moving_the_score() {
        let mut reviews = entries(6, 6, 0);
        for entry in &mut reviews[1..4] {
            entry.body_digest.clone_from(&reviews_digest());
            entry.author = Some("same-name".to_string());
        }
        reviews[5].negative_wording = true;
        let snap = snapshot([0, 0, 0, 2, 4], reviews, 0);
        let plain = snapshot([0, 0, 0, 2, 4], entries(6, 6, 0), 0);

        let scorer = TrustScorer::default();
        let assessment = scorer.score(&snap, &[]);
        let metric = |kind: MetricKind| assessment.metrics[&kind].trust();
        assert_eq!(metric(MetricKind::DuplicateText), Some(1.0 - 2.0 / 6.0));
        assert_eq!(metric(MetricKind::RepeatedAuthors), Some(1.0 - 2.0 / 6.0));
        assert_eq!(metric(MetricKind::RatingTextMismatch), Some(1.0 - 1.0 / 6.0));
        assert!(
            (assessment.score - scorer.score(&plain, &[]).score).abs() < 1e-12,
            "zero-weight signals must not change the score"
        );
    }

    #[test]
    fn test_weighted_duplicates_lower_the_score() {
        let mut copied = entries(4, 4, 0);
        for entry in &mut copied {
            entry.body_digest.clone_from(&reviews_digest());
        }
        let snap = snapshot([0, 0, 0, 2, 2], copied, 0);

        let weighted = TrustScorer::new(ScoringConfig {
            weights: ScoringWeights {
                duplicate_text: 0.5,
                ..ScoringWeights::default()
            },
            ..ScoringConfig::default()
        });
        let baseline = TrustScorer::default().score(&snap, &[]).score;
        let assessment = weighted.score(&snap, &[]);

        assert_eq!(
            assessment.metrics[&MetricKind::DuplicateText].trust(),
            Some(0.25)
        );
        assert!(assessment.score < baseline);
    }

    #[test]
    fn test_text_signals_need_entries() {
        let snap = snapshot([0, 0, 0, 0, 10], vec![], 0);
        let assessment = TrustScorer::default().score(&snap, &[]);
        for kind in [
            MetricKind::DuplicateText,
            MetricKind::RepeatedAuthors,
            MetricKind::RatingTextMismatch,
        ] {
            assert!(matches!(
                assessment.metrics[&kind],
                MetricReading::InsufficientData { .. }
            ));
        }
    }

    fn reviews_digest() -> Option<String> {
        Some("ab".repeat(32))
    }
}
