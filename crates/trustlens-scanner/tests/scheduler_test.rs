use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use trustlens_auth::{Credentials, StaticCredentialProvider, StorageState, StorageStateStore};
use trustlens_browser::{
    Authenticator, FetchOutcome, LoginOutcome, PageFetcher, Session, SessionManager, SessionPolicy,
};
use trustlens_core::{Histogram, MetricKind, MetricReading, ReviewPageSnapshot, Target, TrustAssessment, Verdict};
use trustlens_db::{MemoryArchive, ReviewArchive, ScrapeRecord};
use trustlens_scanner::{
    BackoffPolicy, LastOutcome, SchedulerSettings, ScrapeError, ScrapeScheduler, TrustScorer,
};

const REVIEW_PAGE: &str = include_str!("fixtures/suspicious_en.html");

/// Authenticator double that always signs in.
#[derive(Default)]
struct CountingAuthenticator {
    logins: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn restore(
        &self,
        _session: &Session,
        _state: &StorageState,
    ) -> trustlens_browser::Result<bool> {
        Ok(false)
    }

    async fn login(
        &self,
        _session: &Session,
        _credentials: &Credentials,
    ) -> trustlens_browser::Result<LoginOutcome> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Ok(LoginOutcome::Rejected("wrong password".to_string()));
        }
        Ok(LoginOutcome::Authenticated(StorageState::default()))
    }
}

/// Fetcher double: scripted outcomes first, then the fallback forever.
struct ScriptedFetcher {
    script: Mutex<VecDeque<FetchOutcome>>,
    fallback: FetchOutcome,
    fetches: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedFetcher {
    fn new(script: Vec<FetchOutcome>, fallback: FetchOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            fetches: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn serving_reviews() -> Self {
        Self::new(Vec::new(), FetchOutcome::Success(REVIEW_PAGE.to_string()))
    }

    fn gated(mut self, gate: &Arc<Semaphore>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _target: &Target, _session: &Session) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate open");
        }
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

struct Harness {
    scheduler: ScrapeScheduler,
    fetcher: Arc<ScriptedFetcher>,
    auth: Arc<CountingAuthenticator>,
    archive: Arc<MemoryArchive>,
    _dir: TempDir,
}

fn settings(workers: usize, queue_depth: usize) -> SchedulerSettings {
    SchedulerSettings {
        workers,
        queue_depth,
        max_retries: 3,
        max_hard_failure_retries: 1,
        backoff: BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 0.0),
        history_limit: 10,
    }
}

fn harness(
    fetcher: ScriptedFetcher,
    auth: CountingAuthenticator,
    settings: SchedulerSettings,
) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let fetcher = Arc::new(fetcher);
    let auth = Arc::new(auth);
    let archive = Arc::new(MemoryArchive::new());

    let sessions = SessionManager::new(
        settings.workers,
        Arc::clone(&auth) as Arc<dyn Authenticator>,
        Arc::new(StaticCredentialProvider::new(Credentials::new(
            "ops@example.com",
            "secret",
        ))),
        StorageStateStore::new(dir.path()),
        SessionPolicy {
            max_reauth_attempts: 2,
            soft_block_threshold: 50,
        },
    );

    let scheduler = ScrapeScheduler::new(
        sessions,
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        Arc::clone(&archive) as Arc<dyn ReviewArchive>,
        TrustScorer::default(),
        settings,
    );

    Harness {
        scheduler,
        fetcher,
        auth,
        archive,
        _dir: dir,
    }
}

fn target(id: &str) -> Target {
    format!("JP:{id}").parse().expect("valid target")
}

/// Wait until the fetcher has been entered `count` times.
async fn wait_for_fetches(fetcher: &ScriptedFetcher, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while fetcher.fetches() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("fetcher reached");
}

#[tokio::test]
async fn test_scrape_scores_and_records() {
    let h = harness(
        ScriptedFetcher::serving_reviews(),
        CountingAuthenticator::default(),
        settings(2, 8),
    );
    let t = target("B0SUSPECT1");

    let assessment = h.scheduler.submit(t.clone()).await.expect("scrape succeeds");

    assert_eq!(assessment.verdict, Verdict::Suspicious);
    assert_eq!(h.fetcher.fetches(), 1);
    assert_eq!(h.auth.logins.load(Ordering::SeqCst), 1);

    let records = h.archive.records(&t);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].assessment, assessment);
    assert_eq!(records[0].snapshot.total_reviews(), 100);
    assert_eq!(h.scheduler.in_flight().await, 0);
}

#[tokio::test]
async fn test_concurrent_submissions_share_one_pipeline() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::serving_reviews().gated(&gate),
        CountingAuthenticator::default(),
        settings(2, 8),
    );
    let t = target("B0SUSPECT1");

    let first = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    let second = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    assert!(!first.is_attached());
    assert!(second.is_attached());
    assert_eq!(h.scheduler.in_flight().await, 1);

    gate.add_permits(1);
    let (a, b) = tokio::join!(first, second);

    assert_eq!(a.expect("first result"), b.expect("second result"));
    assert_eq!(h.fetcher.fetches(), 1);
    assert_eq!(h.archive.records(&t).len(), 1);
}

#[tokio::test]
async fn test_soft_blocks_are_retried_until_success() {
    let h = harness(
        ScriptedFetcher::new(
            vec![
                FetchOutcome::SoftBlock("robot check".to_string()),
                FetchOutcome::SoftBlock("rate limited".to_string()),
            ],
            FetchOutcome::Success(REVIEW_PAGE.to_string()),
        ),
        CountingAuthenticator::default(),
        settings(1, 8),
    );

    h.scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect("third attempt succeeds");
    assert_eq!(h.fetcher.fetches(), 3);
}

#[tokio::test]
async fn test_persistent_soft_block_exhausts_retries() {
    let h = harness(
        ScriptedFetcher::new(Vec::new(), FetchOutcome::SoftBlock("robot check".to_string())),
        CountingAuthenticator::default(),
        settings(1, 8),
    );

    let err = h
        .scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect_err("must give up");

    match &err {
        ScrapeError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 4);
            assert_eq!(*last, LastOutcome::SoftBlock("robot check".to_string()));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(err.category(), "source_blocking");
    assert_eq!(h.fetcher.fetches(), 4);
}

#[tokio::test]
async fn test_auth_required_signs_in_again_once() {
    let h = harness(
        ScriptedFetcher::new(
            vec![FetchOutcome::AuthRequired],
            FetchOutcome::Success(REVIEW_PAGE.to_string()),
        ),
        CountingAuthenticator::default(),
        settings(1, 8),
    );

    h.scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect("retry after re-login succeeds");
    assert_eq!(h.fetcher.fetches(), 2);
    assert_eq!(h.auth.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hard_failures_use_smaller_budget() {
    let h = harness(
        ScriptedFetcher::new(Vec::new(), FetchOutcome::HardFailure("timed out".to_string())),
        CountingAuthenticator::default(),
        settings(1, 8),
    );

    let err = h
        .scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect_err("must give up");

    assert!(matches!(
        err,
        ScrapeError::Exhausted {
            attempts: 2,
            last: LastOutcome::HardFailure(_)
        }
    ));
    assert_eq!(h.fetcher.fetches(), 2);
}

#[tokio::test]
async fn test_unrecognized_page_is_not_scored() {
    let mut settings = settings(1, 8);
    settings.max_hard_failure_retries = 0;
    let markup = "<html><body><h1>Page moved</h1><p>Nothing to see here.</p></body></html>";
    let h = harness(
        ScriptedFetcher::new(Vec::new(), FetchOutcome::Success(markup.to_string())),
        CountingAuthenticator::default(),
        settings,
    );
    let t = target("B0SUSPECT1");

    let err = h.scheduler.submit(t.clone()).await.expect_err("must fail");

    assert!(matches!(err, ScrapeError::Unrecognized(_)));
    assert_eq!(err.category(), "target_unrecognized");
    assert!(h.archive.records(&t).is_empty());
}

#[tokio::test]
async fn test_full_queue_rejects_without_blocking() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::serving_reviews().gated(&gate),
        CountingAuthenticator::default(),
        settings(1, 1),
    );

    let running = h
        .scheduler
        .enqueue(target("B000000001"))
        .await
        .expect("enqueue");
    wait_for_fetches(&h.fetcher, 1).await;
    let queued = h
        .scheduler
        .enqueue(target("B000000002"))
        .await
        .expect("one job fits in the queue");
    let err = h
        .scheduler
        .enqueue(target("B000000003"))
        .await
        .err()
        .expect("queue is full");

    assert!(matches!(err, ScrapeError::Overloaded { depth: 1 }));
    assert_eq!(err.category(), "overloaded");

    gate.add_permits(2);
    running.await.expect("running job completes");
    queued.await.expect("queued job completes");
    assert_eq!(h.fetcher.fetches(), 2);
}

#[tokio::test]
async fn test_cancel_before_admission_skips_fetch() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::serving_reviews().gated(&gate),
        CountingAuthenticator::default(),
        settings(1, 4),
    );

    let running = h
        .scheduler
        .enqueue(target("B000000001"))
        .await
        .expect("enqueue");
    let mut waiting = h
        .scheduler
        .enqueue(target("B000000002"))
        .await
        .expect("enqueue");
    waiting.cancel().await;
    // Both stay tracked until a worker has dealt with them
    assert_eq!(h.scheduler.in_flight().await, 2);

    gate.add_permits(1);
    running.await.expect("running job completes");
    let err = waiting.await.expect_err("cancelled job has no result");
    assert!(matches!(err, ScrapeError::Cancelled));
    assert_eq!(h.scheduler.in_flight().await, 0);
    h.scheduler.shutdown().await;

    assert_eq!(h.fetcher.fetches(), 1);
    assert!(h.archive.records(&target("B000000002")).is_empty());
}

#[tokio::test]
async fn test_cancel_during_first_attempt_skips_retries() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::new(
            vec![FetchOutcome::SoftBlock("robot check".to_string())],
            FetchOutcome::SoftBlock("robot check".to_string()),
        )
        .gated(&gate),
        CountingAuthenticator::default(),
        settings(1, 4),
    );
    let t = target("B0SUSPECT1");

    let mut ticket = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    wait_for_fetches(&h.fetcher, 1).await;
    ticket.cancel().await;
    gate.add_permits(10);

    let err = ticket.await.expect_err("cancelled");
    assert!(matches!(err, ScrapeError::Cancelled));
    assert_eq!(h.fetcher.fetches(), 1);
    assert!(h.archive.records(&t).is_empty());
}

#[tokio::test]
async fn test_resubmit_after_cancel_waits_for_running_attempt() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::serving_reviews().gated(&gate),
        CountingAuthenticator::default(),
        settings(2, 8),
    );
    let t = target("B0SUSPECT1");

    let mut first = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    wait_for_fetches(&h.fetcher, 1).await;
    first.cancel().await;

    let second = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    assert!(!second.is_attached());

    // The idle worker must not start a second attempt alongside the first
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.fetcher.fetches(), 1);

    gate.add_permits(2);
    let _ = first.await;
    second.await.expect("new pipeline completes");
    assert_eq!(h.fetcher.fetches(), 2);
    assert_eq!(h.scheduler.in_flight().await, 0);
}

#[tokio::test]
async fn test_cancel_waits_for_every_attached_caller() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        ScriptedFetcher::serving_reviews().gated(&gate),
        CountingAuthenticator::default(),
        settings(1, 4),
    );
    let t = target("B0SUSPECT1");

    let mut first = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    let second = h.scheduler.enqueue(t.clone()).await.expect("enqueue");
    first.cancel().await;
    first.cancel().await;
    assert_eq!(h.scheduler.in_flight().await, 1);

    gate.add_permits(1);
    second.await.expect("remaining caller still gets a result");
    first.await.expect("withdrawn caller sees the same result");
}

#[tokio::test]
async fn test_blocked_pool_reports_no_session() {
    let h = harness(
        ScriptedFetcher::serving_reviews(),
        CountingAuthenticator {
            reject: true,
            ..CountingAuthenticator::default()
        },
        settings(1, 4),
    );

    let err = h
        .scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect_err("no session can sign in");

    assert!(matches!(err, ScrapeError::NoSessionAvailable));
    assert_eq!(err.category(), "session_pool");
    assert_eq!(h.fetcher.fetches(), 0);
}

#[tokio::test]
async fn test_history_feeds_velocity_metric() {
    let h = harness(
        ScriptedFetcher::serving_reviews(),
        CountingAuthenticator::default(),
        settings(1, 4),
    );
    let t = target("B0SUSPECT1");

    let yesterday = Utc::now() - ChronoDuration::days(1);
    let earlier = ReviewPageSnapshot::new(
        Histogram::from_counts([12, 1, 2, 5, 79]),
        Vec::new(),
        None,
        yesterday,
    )
    .expect("valid snapshot");
    h.archive
        .record(&ScrapeRecord {
            target: t.clone(),
            captured_at: yesterday,
            snapshot: earlier,
            assessment: TrustAssessment {
                score: 0.3,
                metrics: BTreeMap::new(),
                verdict: Verdict::Suspicious,
            },
        })
        .await
        .expect("seed history");

    let assessment = h.scheduler.submit(t.clone()).await.expect("scrape succeeds");

    assert!(matches!(
        assessment.metrics[&MetricKind::VelocityAnomaly],
        MetricReading::Measured { .. }
    ));
    assert_eq!(h.archive.records(&t).len(), 2);
}

#[tokio::test]
async fn test_shutdown_refuses_new_work() {
    let h = harness(
        ScriptedFetcher::serving_reviews(),
        CountingAuthenticator::default(),
        settings(1, 4),
    );

    h.scheduler.shutdown().await;

    let err = h
        .scheduler
        .submit(target("B0SUSPECT1"))
        .await
        .expect_err("scheduler stopped");
    assert!(matches!(err, ScrapeError::Shutdown));
}
