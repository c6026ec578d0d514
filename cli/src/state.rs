//! Pipeline wiring shared by one CLI run.

use anyhow::Context;
use std::sync::Arc;
use trustlens_auth::EnvCredentialProvider;
use trustlens_browser::{BrowserEngine, ChromeAuthenticator, ChromeFetcher, SessionManager};
use trustlens_core::AppConfig;
use trustlens_db::{Database, MemoryArchive, ReviewArchive, SqliteArchive};
use trustlens_scanner::{SchedulerSettings, ScrapeScheduler, TrustScorer};

/// Everything a run needs: one browser, its session pool and the scheduler.
pub struct AppState {
    /// Scheduler fed by the CLI
    pub scheduler: ScrapeScheduler,
    /// Shared browser; kept alive for the lifetime of the run
    pub engine: Arc<BrowserEngine>,
}

impl AppState {
    /// Launch the browser and start the scheduler.
    ///
    /// Snapshots go to `database.path` when set, otherwise they are kept in
    /// memory for the run only.
    pub async fn start(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(
            BrowserEngine::launch(&config.browser, config.scraping.min_request_interval_ms)
                .await
                .context("failed to launch browser")?,
        );

        let authenticator = Arc::new(ChromeAuthenticator::new(
            Arc::clone(&engine),
            &config.scraping,
            &config.sessions,
        ));
        let sessions = SessionManager::from_config(
            &config.sessions,
            authenticator,
            Arc::new(EnvCredentialProvider::new()),
        );
        let fetcher = Arc::new(ChromeFetcher::new(Arc::clone(&engine), &config.scraping));
        let archive = open_archive(config).await?;

        tracing::info!(
            "Session pool of {} ready; session state in {}",
            sessions.size(),
            config.sessions.state_dir.display()
        );

        let scheduler = ScrapeScheduler::new(
            sessions,
            fetcher,
            archive,
            TrustScorer::new(config.scoring.clone()),
            SchedulerSettings::from_config(config),
        );

        Ok(Self { scheduler, engine })
    }
}

/// Archive selected by the `[database]` section.
pub async fn open_archive(config: &AppConfig) -> anyhow::Result<Arc<dyn ReviewArchive>> {
    match &config.database.path {
        Some(path) => {
            let db = Database::open(path)
                .await
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            Ok(Arc::new(SqliteArchive::new(db)))
        }
        None => {
            tracing::info!("No database path configured; history is kept for this run only");
            Ok(Arc::new(MemoryArchive::new()))
        }
    }
}
