//! Per-target results, rendered as text or JSON.

use crate::error::CommandError;
use serde::Serialize;
use std::fmt::Write as _;
use trustlens_core::{MetricReading, Target, TrustAssessment};
use trustlens_scanner::ScrapeError;

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    /// Target as given to the scheduler
    pub target: String,
    /// Assessment or error
    #[serde(flatten)]
    pub outcome: ReportOutcome,
}

/// Success or failure of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Scored
    Scored {
        /// Assessment
        assessment: TrustAssessment,
    },
    /// Failed
    Failed {
        /// Reported error
        error: CommandError,
    },
}

impl TargetReport {
    /// Build a report from a scheduler result.
    pub fn new(target: &Target, result: &Result<TrustAssessment, ScrapeError>) -> Self {
        let outcome = match result {
            Ok(assessment) => ReportOutcome::Scored {
                assessment: assessment.clone(),
            },
            Err(e) => ReportOutcome::Failed {
                error: CommandError::from(e),
            },
        };
        Self {
            target: target.to_string(),
            outcome,
        }
    }

    /// Whether the target was scored.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReportOutcome::Scored { .. })
    }
}

/// Human-readable summary, one block per target.
pub fn render_text(reports: &[TargetReport]) -> String {
    let mut out = String::new();
    for report in reports {
        match &report.outcome {
            ReportOutcome::Scored { assessment } => {
                let _ = writeln!(
                    out,
                    "{}  {:.2}  {}",
                    report.target, assessment.score, assessment.verdict
                );
                for (kind, reading) in &assessment.metrics {
                    let detail = match reading {
                        MetricReading::Measured {
                            trust,
                            contribution,
                            ..
                        } => format!("{trust:.2} (contributes {contribution:.3})"),
                        MetricReading::Neutral { trust, .. } => format!("{trust:.2} (neutral)"),
                        MetricReading::InsufficientData { .. } => "insufficient data".to_string(),
                    };
                    let _ = writeln!(out, "    {:<18} {detail}", kind.as_str());
                }
            }
            ReportOutcome::Failed { error } => {
                let _ = writeln!(out, "{}  failed [{}]: {}", report.target, error.code, error.message);
            }
        }
    }
    out
}

/// JSON array of reports.
pub fn render_json(reports: &[TargetReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}
