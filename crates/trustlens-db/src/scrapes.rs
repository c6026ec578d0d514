//! Scored capture rows.
//!
//! Snapshots and assessments are stored as JSON next to a few scalar
//! columns used for lookup and listing.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Pool, Sqlite};
use trustlens_core::{ReviewPageSnapshot, Target, TrustAssessment};

/// A stored capture row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredScrape {
    /// Row id (UUID v4)
    pub id: String,
    /// Capture the row describes
    pub snapshot: ReviewPageSnapshot,
    /// Score computed for the capture
    pub assessment: TrustAssessment,
    /// When the row was written
    pub created_at: String,
}

/// Fixed-width timestamp so lexical order matches chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert a scored capture for `target`.
///
/// # Errors
/// Returns `DatabaseError` if serialization or the insert fails.
pub async fn insert_scrape(
    pool: &Pool<Sqlite>,
    target: &Target,
    snapshot: &ReviewPageSnapshot,
    assessment: &TrustAssessment,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let snapshot_json = serde_json::to_string(snapshot)?;
    let assessment_json = serde_json::to_string(assessment)?;
    let total = i64::try_from(snapshot.total_reviews())
        .map_err(|_| DatabaseError::OutOfRange(format!("review total for {target}")))?;

    sqlx::query(
        "INSERT INTO scrape_records
            (id, marketplace, product_id, captured_at, total_reviews, score, verdict, snapshot, assessment, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(target.marketplace().code())
    .bind(target.product_id().as_str())
    .bind(timestamp(snapshot.captured_at()))
    .bind(total)
    .bind(assessment.score)
    .bind(assessment.verdict.as_str())
    .bind(snapshot_json)
    .bind(assessment_json)
    .bind(timestamp(Utc::now()))
    .execute(pool)
    .await?;

    tracing::debug!("Stored capture {} for {}", id, target);
    Ok(id)
}

/// Load up to `limit` most recent snapshots for `target`, oldest first.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a stored snapshot cannot
/// be decoded.
pub async fn load_history(
    pool: &Pool<Sqlite>,
    target: &Target,
    limit: usize,
) -> Result<Vec<ReviewPageSnapshot>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let rows = sqlx::query_scalar::<_, String>(
        "SELECT snapshot FROM (
            SELECT snapshot, captured_at FROM scrape_records
            WHERE marketplace = ? AND product_id = ?
            ORDER BY captured_at DESC
            LIMIT ?
         ) ORDER BY captured_at ASC",
    )
    .bind(target.marketplace().code())
    .bind(target.product_id().as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|json| {
            serde_json::from_str(json).map_err(|e| {
                DatabaseError::CorruptRecord {
                    target: target.to_string(),
                    reason: format!("snapshot: {e}"),
                }
            })
        })
        .collect()
}

/// Most recent stored capture for `target`.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or the row cannot be decoded.
pub async fn latest(pool: &Pool<Sqlite>, target: &Target) -> Result<Option<StoredScrape>> {
    let row = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT id, snapshot, assessment, created_at FROM scrape_records
         WHERE marketplace = ? AND product_id = ?
         ORDER BY captured_at DESC
         LIMIT 1",
    )
    .bind(target.marketplace().code())
    .bind(target.product_id().as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|(id, snapshot, assessment, created_at)| {
        Ok(StoredScrape {
            snapshot: serde_json::from_str(&snapshot)
                .map_err(|e| corrupt(target, &id, "snapshot", &e))?,
            assessment: serde_json::from_str(&assessment)
                .map_err(|e| corrupt(target, &id, "assessment", &e))?,
            id,
            created_at,
        })
    })
    .transpose()
}

fn corrupt(target: &Target, id: &str, column: &str, e: &serde_json::Error) -> DatabaseError {
    DatabaseError::CorruptRecord {
        target: target.to_string(),
        reason: format!("{column} of row {id}: {e}"),
    }
}

/// Number of stored captures for `target`.
///
/// # Errors
/// Returns `DatabaseError` if the query fails.
pub async fn count_for(pool: &Pool<Sqlite>, target: &Target) -> Result<u64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM scrape_records WHERE marketplace = ? AND product_id = ?",
    )
    .bind(target.marketplace().code())
    .bind(target.product_id().as_str())
    .fetch_one(pool)
    .await?;

    Ok(u64::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use trustlens_core::{Histogram, Verdict};

    fn target(id: &str) -> Target {
        format!("JP:{id}").parse().expect("valid target")
    }

    fn snapshot(total: u64, days: i64) -> ReviewPageSnapshot {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("date")
            + Duration::days(days);
        ReviewPageSnapshot::new(Histogram::from_counts([0, 0, 0, 0, total]), Vec::new(), None, at)
            .expect("valid snapshot")
    }

    fn assessment(score: f64) -> TrustAssessment {
        TrustAssessment {
            score,
            metrics: BTreeMap::new(),
            verdict: Verdict::Caution,
        }
    }

    #[tokio::test]
    async fn test_history_is_newest_n_oldest_first() {
        let db = Database::in_memory().await.expect("open database");
        let t = target("B000000001");
        for day in 0..5 {
            insert_scrape(db.pool(), &t, &snapshot(10 + day as u64, day), &assessment(0.5))
                .await
                .expect("insert");
        }

        let history = load_history(db.pool(), &t, 3).await.expect("history");
        let totals: Vec<u64> = history.iter().map(ReviewPageSnapshot::total_reviews).collect();
        assert_eq!(totals, vec![12, 13, 14]);
    }

    #[tokio::test]
    async fn test_history_is_per_target() {
        let db = Database::in_memory().await.expect("open database");
        let a = target("B000000001");
        let b = target("B000000002");
        insert_scrape(db.pool(), &a, &snapshot(5, 0), &assessment(0.5))
            .await
            .expect("insert");

        assert!(load_history(db.pool(), &b, 10).await.expect("history").is_empty());
        assert!(load_history(db.pool(), &a, 0).await.expect("history").is_empty());
        assert_eq!(count_for(db.pool(), &a).await.expect("count"), 1);
        assert_eq!(count_for(db.pool(), &b).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_latest_round_trips_assessment() {
        let db = Database::in_memory().await.expect("open database");
        let t = target("B000000003");
        assert!(latest(db.pool(), &t).await.expect("latest").is_none());

        insert_scrape(db.pool(), &t, &snapshot(7, 0), &assessment(0.25))
            .await
            .expect("insert");
        let id = insert_scrape(db.pool(), &t, &snapshot(9, 1), &assessment(0.75))
            .await
            .expect("insert");

        let row = latest(db.pool(), &t).await.expect("latest").expect("row");
        assert_eq!(row.id, id);
        assert_eq!(row.snapshot.total_reviews(), 9);
        assert!((row.assessment.score - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let db = Database::in_memory().await.expect("open database");
        let t = target("B000000004");
        insert_scrape(db.pool(), &t, &snapshot(1, 0), &assessment(0.5))
            .await
            .expect("insert");
        sqlx::query("UPDATE scrape_records SET snapshot = 'not json'")
            .execute(db.pool())
            .await
            .expect("corrupt row");

        let err = load_history(db.pool(), &t, 5).await.expect_err("decode must fail");
        assert!(matches!(err, DatabaseError::CorruptRecord { .. }));
    }
}
