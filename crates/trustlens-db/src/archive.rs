//! Review archive abstraction.
//!
//! The scrape scheduler reads prior snapshots through [`ReviewArchive`] to
//! feed the velocity metric and records every scored capture afterwards.
//! [`SqliteArchive`] is the durable implementation; [`MemoryArchive`] keeps
//! everything in process and backs tests and runs without a database path.

use crate::connection::Database;
use crate::error::Result;
use crate::scrapes;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use trustlens_core::{ReviewPageSnapshot, Target, TrustAssessment};

/// One scored capture handed to the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRecord {
    /// Scraped target
    pub target: Target,
    /// When the page was captured
    pub captured_at: DateTime<Utc>,
    /// Parsed page
    pub snapshot: ReviewPageSnapshot,
    /// Score computed for the page
    pub assessment: TrustAssessment,
}

/// Storage for scored captures.
#[async_trait]
pub trait ReviewArchive: Send + Sync {
    /// Up to `limit` most recent snapshots for `target`, oldest first.
    async fn load_history(&self, target: &Target, limit: usize) -> Result<Vec<ReviewPageSnapshot>>;

    /// Persist a scored capture.
    async fn record(&self, record: &ScrapeRecord) -> Result<()>;
}

/// Process-local archive.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<HashMap<Target, Vec<ScrapeRecord>>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records stored for `target`, in capture order.
    #[must_use]
    pub fn records(&self, target: &Target) -> Vec<ScrapeRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReviewArchive for MemoryArchive {
    async fn load_history(&self, target: &Target, limit: usize) -> Result<Vec<ReviewPageSnapshot>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = records.get(target) else {
            return Ok(Vec::new());
        };
        let skip = list.len().saturating_sub(limit);
        Ok(list.iter().skip(skip).map(|r| r.snapshot.clone()).collect())
    }

    async fn record(&self, record: &ScrapeRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let list = records.entry(record.target.clone()).or_default();
        list.push(record.clone());
        list.sort_by_key(|r| r.captured_at);
        Ok(())
    }
}

/// Archive backed by the `scrape_records` table.
#[derive(Debug, Clone)]
pub struct SqliteArchive {
    db: Database,
}

impl SqliteArchive {
    /// Wrap an opened, migrated database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ReviewArchive for SqliteArchive {
    async fn load_history(&self, target: &Target, limit: usize) -> Result<Vec<ReviewPageSnapshot>> {
        scrapes::load_history(self.db.pool(), target, limit).await
    }

    async fn record(&self, record: &ScrapeRecord) -> Result<()> {
        scrapes::insert_scrape(
            self.db.pool(),
            &record.target,
            &record.snapshot,
            &record.assessment,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use trustlens_core::{Histogram, Verdict};

    fn record(target: &Target, total: u64, day: i64) -> ScrapeRecord {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("date")
            + Duration::days(day);
        let snapshot = ReviewPageSnapshot::new(
            Histogram::from_counts([0, 0, 0, total, 0]),
            Vec::new(),
            None,
            at,
        )
        .expect("valid snapshot");
        ScrapeRecord {
            target: target.clone(),
            captured_at: at,
            snapshot,
            assessment: TrustAssessment {
                score: 0.8,
                metrics: BTreeMap::new(),
                verdict: Verdict::Trusted,
            },
        }
    }

    async fn exercise(archive: &dyn ReviewArchive) {
        let target: Target = "JP:B0C1234XYZ".parse().expect("target");
        assert!(archive.load_history(&target, 5).await.expect("empty").is_empty());

        for (day, total) in [(2, 30), (0, 10), (1, 20)] {
            archive.record(&record(&target, total, day)).await.expect("record");
        }

        let history = archive.load_history(&target, 2).await.expect("history");
        let totals: Vec<u64> = history.iter().map(ReviewPageSnapshot::total_reviews).collect();
        assert_eq!(totals, vec![20, 30]);
    }

    #[tokio::test]
    async fn test_memory_archive_history() {
        let archive = MemoryArchive::new();
        exercise(&archive).await;

        let target: Target = "JP:B0C1234XYZ".parse().expect("target");
        assert_eq!(archive.records(&target).len(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_archive_history() {
        let archive = SqliteArchive::new(Database::in_memory().await.expect("open database"));
        exercise(&archive).await;
    }

    #[tokio::test]
    async fn test_sqlite_archive_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("archive.db");
        let target: Target = "JP:B0C1234XYZ".parse().expect("target");

        let db = Database::open(&path).await.expect("open database");
        SqliteArchive::new(db.clone())
            .record(&record(&target, 42, 0))
            .await
            .expect("record");
        db.close().await;

        let archive = SqliteArchive::new(Database::open(&path).await.expect("reopen database"));
        let history = archive.load_history(&target, 10).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_reviews(), 42);
    }
}
