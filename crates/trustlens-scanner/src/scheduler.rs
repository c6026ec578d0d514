//! Scrape scheduler for coordinating target pipelines.
//!
//! This module provides the `ScrapeScheduler` which runs each submitted
//! target through fetch, parse and score on a fixed pool of workers, with
//! per-target deduplication, bounded queueing and retry with backoff.

use crate::backoff::BackoffPolicy;
use crate::error::{LastOutcome, Result, ScrapeError};
use crate::parser::{self, ParseError};
use crate::scorer::TrustScorer;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trustlens_browser::{FetchOutcome, PageFetcher, SessionManager};
use trustlens_core::{AppConfig, ReviewPageSnapshot, Target, TrustAssessment};
use trustlens_db::{ReviewArchive, ScrapeRecord};

type SharedResult = Shared<BoxFuture<'static, Result<TrustAssessment>>>;

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Worker count; one worker holds at most one session at a time
    pub workers: usize,
    /// Jobs allowed to wait for a worker before submissions are rejected
    pub queue_depth: usize,
    /// Retries after `SoftBlock` or `AuthRequired`
    pub max_retries: u32,
    /// Retries after `HardFailure` or an unrecognized page
    pub max_hard_failure_retries: u32,
    /// Delay policy between attempts
    pub backoff: BackoffPolicy,
    /// Prior snapshots handed to the scorer
    pub history_limit: usize,
}

impl SchedulerSettings {
    /// Settings from the application config. Worker count follows the
    /// session pool size.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workers: config.sessions.pool_size,
            queue_depth: config.scheduler.queue_depth,
            max_retries: config.scheduler.max_retries,
            max_hard_failure_retries: config.scheduler.max_hard_failure_retries,
            backoff: BackoffPolicy::from_config(&config.scheduler),
            history_limit: config.database.history_limit as usize,
        }
    }
}

struct Job {
    target: Target,
    generation: u64,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<TrustAssessment>>,
    /// Cancelled pipeline for the same target that must wind down first
    after: Option<SharedResult>,
}

struct InFlight {
    generation: u64,
    result: SharedResult,
    cancel: CancellationToken,
    callers: usize,
}

struct Inner {
    sessions: Arc<SessionManager>,
    fetcher: Arc<dyn PageFetcher>,
    archive: Arc<dyn ReviewArchive>,
    scorer: TrustScorer,
    settings: SchedulerSettings,
    in_flight: Mutex<HashMap<Target, InFlight>>,
    queue: mpsc::Sender<Job>,
    generations: AtomicU64,
    shutdown: CancellationToken,
}

/// Pending result of a submission.
///
/// Resolves to the shared result of the target's pipeline. Several tickets
/// may share one pipeline when the same target was submitted concurrently.
pub struct ScrapeTicket {
    target: Target,
    generation: u64,
    attached: bool,
    withdrawn: bool,
    result: SharedResult,
    inner: Arc<Inner>,
}

impl ScrapeTicket {
    /// Target this ticket waits for.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Whether this submission joined a pipeline that was already in flight.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Withdraw this caller. Calling it again has no effect.
    ///
    /// The pipeline is cancelled once every attached caller has withdrawn: a
    /// job still queued is skipped and a running one makes no further
    /// retries after its current attempt. The ticket can still be awaited
    /// to learn how the pipeline ended.
    pub async fn cancel(&mut self) {
        if std::mem::replace(&mut self.withdrawn, true) {
            return;
        }
        let mut in_flight = self.inner.in_flight.lock().await;
        let Some(entry) = in_flight.get_mut(&self.target) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }
        entry.callers = entry.callers.saturating_sub(1);
        if entry.callers == 0 {
            // The entry stays until the worker is done with the job
            tracing::debug!("Cancelling scrape of {}", self.target);
            entry.cancel.cancel();
        }
    }
}

impl Future for ScrapeTicket {
    type Output = Result<TrustAssessment>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.result.poll_unpin(cx)
    }
}

/// Runs review scrapes across the session pool.
pub struct ScrapeScheduler {
    inner: Arc<Inner>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ScrapeScheduler {
    /// Create a scheduler and start its workers.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        fetcher: Arc<dyn PageFetcher>,
        archive: Arc<dyn ReviewArchive>,
        scorer: TrustScorer,
        settings: SchedulerSettings,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(settings.queue_depth.max(1));
        let worker_count = settings.workers.max(1);

        let inner = Arc::new(Inner {
            sessions,
            fetcher,
            archive,
            scorer,
            settings,
            in_flight: Mutex::new(HashMap::new()),
            queue,
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..worker_count)
            .map(|index| {
                let inner = Arc::clone(&inner);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { inner.work(index, receiver).await })
            })
            .collect();

        tracing::info!("Scrape scheduler started with {} workers", worker_count);

        Self {
            inner,
            workers: std::sync::Mutex::new(workers),
        }
    }

    /// Queue `target` without waiting for its result.
    ///
    /// Joins the pipeline already in flight for the same target if there is
    /// one. A pipeline whose callers all withdrew is not joined; the new job
    /// waits until it has wound down, so attempts for one target never
    /// overlap. Fails fast with `Overloaded` when the queue is full.
    pub async fn enqueue(&self, target: Target) -> Result<ScrapeTicket> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ScrapeError::Shutdown);
        }

        let mut in_flight = self.inner.in_flight.lock().await;
        let mut after = None;
        if let Some(entry) = in_flight.get_mut(&target) {
            if entry.cancel.is_cancelled() {
                tracing::debug!("{} is winding down after cancellation; queueing behind it", target);
                after = Some(entry.result.clone());
            } else {
                entry.callers += 1;
                tracing::debug!("{} already in flight; attaching caller {}", target, entry.callers);
                return Ok(ScrapeTicket {
                    target,
                    generation: entry.generation,
                    attached: true,
                    withdrawn: false,
                    result: entry.result.clone(),
                    inner: Arc::clone(&self.inner),
                });
            }
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.shutdown.child_token();
        let (reply, receiver) = oneshot::channel();
        let job = Job {
            target: target.clone(),
            generation,
            cancel: cancel.clone(),
            reply,
            after,
        };

        match self.inner.queue.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Rejecting {}: queue is full", target);
                return Err(ScrapeError::Overloaded {
                    depth: self.inner.settings.queue_depth,
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(ScrapeError::Shutdown),
        }

        let result = async move { receiver.await.unwrap_or(Err(ScrapeError::Shutdown)) }
            .boxed()
            .shared();
        in_flight.insert(
            target.clone(),
            InFlight {
                generation,
                result: result.clone(),
                cancel,
                callers: 1,
            },
        );
        tracing::debug!("Queued {}", target);

        Ok(ScrapeTicket {
            target,
            generation,
            attached: false,
            withdrawn: false,
            result,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Scrape and score `target`, waiting for the result.
    pub async fn submit(&self, target: Target) -> Result<TrustAssessment> {
        self.enqueue(target).await?.await
    }

    /// Number of targets queued or running.
    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    /// Stop accepting work, let running attempts finish, then persist
    /// session state.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!("Scrape worker panicked: {}", e);
            }
        }
        self.inner.sessions.shutdown().await;
        tracing::info!("Scrape scheduler stopped");
    }
}

impl Inner {
    async fn work(&self, index: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    () = self.shutdown.cancelled() => None,
                    job = receiver.recv() => job,
                }
            };
            let Some(job) = job else { break };

            if let Some(previous) = job.after {
                tracing::debug!("Worker {} waiting for the previous run of {}", index, job.target);
                tokio::select! {
                    biased;
                    () = job.cancel.cancelled() => {}
                    _ = previous => {}
                }
            }

            let result = if job.cancel.is_cancelled() {
                Err(ScrapeError::Cancelled)
            } else {
                tracing::debug!("Worker {} picked up {}", index, job.target);
                self.run(&job.target, &job.cancel).await
            };

            {
                let mut in_flight = self.in_flight.lock().await;
                if in_flight
                    .get(&job.target)
                    .is_some_and(|entry| entry.generation == job.generation)
                {
                    in_flight.remove(&job.target);
                }
            }

            match &result {
                Ok(assessment) => tracing::info!(
                    "Scored {}: {:.3} ({})",
                    job.target,
                    assessment.score,
                    assessment.verdict
                ),
                Err(e) => tracing::warn!("Scrape of {} failed: {}", job.target, e),
            }
            // Every caller may have withdrawn already
            let _ = job.reply.send(result);
        }
        tracing::debug!("Worker {} exiting", index);
    }

    /// One target's pipeline: attempts in strict sequence until a scored
    /// result or an exhausted budget.
    async fn run(&self, target: &Target, cancel: &CancellationToken) -> Result<TrustAssessment> {
        let settings = &self.settings;
        let mut attempts = 0u32;
        let mut soft_retries = 0u32;
        let mut hard_retries = 0u32;

        loop {
            attempts += 1;

            let handle = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                handle = self.sessions.acquire() => handle?,
            };
            tracing::debug!("Attempt {} for {} on {}", attempts, target, handle.id());
            let outcome = self.fetcher.fetch(target, handle.session()).await;
            self.sessions.release(handle, &outcome).await;

            let last = match outcome {
                FetchOutcome::Success(markup) => match parser::parse(&markup) {
                    Ok(snapshot) => return self.assess(target, snapshot).await,
                    Err(ParseError::Unrecognized(reason)) => LastOutcome::Unrecognized(reason),
                },
                other => match LastOutcome::from_fetch(&other) {
                    Some(last) => last,
                    None => return Err(ScrapeError::Internal("unclassified fetch".to_string())),
                },
            };

            let (used, budget) = match last {
                LastOutcome::SoftBlock(_) | LastOutcome::AuthRequired => {
                    (&mut soft_retries, settings.max_retries)
                }
                LastOutcome::HardFailure(_) | LastOutcome::Unrecognized(_) => {
                    (&mut hard_retries, settings.max_hard_failure_retries)
                }
            };
            if *used >= budget {
                return Err(match last {
                    LastOutcome::Unrecognized(reason) if attempts == 1 => {
                        ScrapeError::Unrecognized(reason)
                    }
                    last => ScrapeError::Exhausted { attempts, last },
                });
            }
            *used += 1;

            let delay = settings.backoff.delay(attempts - 1);
            tracing::warn!(
                "Attempt {} for {} ended with {}; retrying in {:?}",
                attempts,
                target,
                last,
                delay
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn assess(&self, target: &Target, snapshot: ReviewPageSnapshot) -> Result<TrustAssessment> {
        let history = self
            .archive
            .load_history(target, self.settings.history_limit)
            .await?;
        let assessment = self.scorer.score(&snapshot, &history);

        self.archive
            .record(&ScrapeRecord {
                target: target.clone(),
                captured_at: snapshot.captured_at(),
                snapshot,
                assessment: assessment.clone(),
            })
            .await?;
        Ok(assessment)
    }
}
