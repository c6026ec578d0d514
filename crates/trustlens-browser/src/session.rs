//! Session manager: a fixed arena of authenticated browser sessions.
//!
//! Sessions live in numbered slots. `acquire` checks one out (making sure it
//! is signed in first) and hands back a [`SessionHandle`]; the handle returns
//! the session to its slot when it is released, invalidated or dropped. A
//! checked-out session is physically absent from the arena, so two workers
//! can never hold the same session.

use crate::error::{Result, SessionError, SessionResult};
use crate::fetcher::FetchOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use trustlens_auth::{
    CredentialProvider, Credentials, LoginState, SessionEvent, StorageState, StorageStateStore,
};
use trustlens_core::SessionsConfig;

/// Identifies a session by its arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(usize);

impl SessionId {
    /// Identify the session in pool slot `slot`.
    pub fn new(slot: usize) -> Self {
        Self(slot)
    }

    /// Zero-based pool slot.
    pub fn slot(self) -> usize {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Login steps that need a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interstitial {
    /// One-time code requested and none was supplied
    Otp,
    /// Captcha on the login form
    Captcha,
    /// Passkey prompt with no password fallback
    Passkey,
    /// Account verification or challenge page
    Challenge,
}

impl fmt::Display for Interstitial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Otp => "one-time code requested",
            Self::Captcha => "captcha",
            Self::Passkey => "passkey prompt",
            Self::Challenge => "account challenge",
        };
        write!(f, "{text}")
    }
}

/// What a login attempt ended with.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Signed in; carries the cookies to persist
    Authenticated(StorageState),
    /// Stopped at a step that needs a human
    Interstitial(Interstitial),
    /// The site refused the credentials or the flow broke
    Rejected(String),
}

/// Drives the site-specific login flow for a session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Apply a saved storage state and report whether it is still signed in.
    async fn restore(&self, session: &Session, state: &StorageState) -> Result<bool>;

    /// Run the login flow with fresh credentials.
    async fn login(&self, session: &Session, credentials: &Credentials) -> Result<LoginOutcome>;

    /// Current cookies of the session, for persisting on shutdown.
    async fn capture(&self, session: &Session) -> Result<StorageState> {
        Ok(session.storage_state().clone())
    }

    /// Drop any browser-side state of a retired session.
    async fn discard(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}

/// One browsing context and its login lifecycle.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    state: LoginState,
    storage: StorageState,
    last_used: Option<DateTime<Utc>>,
    failed_logins: u32,
    consecutive_soft_blocks: u32,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            state: LoginState::Anonymous,
            storage: StorageState::default(),
            last_used: None,
            failed_logins: 0,
            consecutive_soft_blocks: 0,
        }
    }

    /// Pool slot this session occupies.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current login state.
    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Cookies captured at the last successful login or restore.
    pub fn storage_state(&self) -> &StorageState {
        &self.storage
    }

    /// When the session was last handed out or returned, if ever.
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    fn apply(&mut self, event: SessionEvent) -> SessionResult<()> {
        self.state = self.state.transition(event)?;
        Ok(())
    }
}

/// Limits that decide when a session is retired.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Failed logins before the session is blocked
    pub max_reauth_attempts: u32,
    /// Consecutive soft blocks before the session is blocked
    pub soft_block_threshold: u32,
}

impl From<&SessionsConfig> for SessionPolicy {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            max_reauth_attempts: config.max_reauth_attempts.max(1),
            soft_block_threshold: config.soft_block_threshold.max(1),
        }
    }
}

struct Pool {
    /// `None` while the session is checked out
    slots: Vec<Option<Session>>,
    /// Last known state per slot, including checked-out ones
    states: Vec<LoginState>,
}

impl Pool {
    fn checkout(&mut self) -> Option<Session> {
        let usable = |wanted: fn(LoginState) -> bool| {
            self.slots
                .iter()
                .position(|slot| slot.as_ref().is_some_and(|s| wanted(s.state)))
        };

        let index = usable(LoginState::is_usable).or_else(|| usable(|s| !s.is_terminal()))?;
        self.slots[index].take()
    }
}

/// Exclusive lease on one session.
pub struct SessionHandle {
    manager: Arc<SessionManager>,
    session: Session,
}

impl SessionHandle {
    /// Borrowed session, valid while the handle is held.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Slot of the borrowed session.
    pub fn id(&self) -> SessionId {
        self.session.id
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let placeholder = Session::new(self.session.id);
        let session = std::mem::replace(&mut self.session, placeholder);
        self.manager.check_in(session);
    }
}

/// Owns the session arena and every login state transition.
pub struct SessionManager {
    pool: Mutex<Pool>,
    available: Notify,
    closing: AtomicBool,
    authenticator: Arc<dyn Authenticator>,
    credentials: Arc<dyn CredentialProvider>,
    store: StorageStateStore,
    policy: SessionPolicy,
}

impl SessionManager {
    /// Create a pool of `size` anonymous sessions.
    pub fn new(
        size: usize,
        authenticator: Arc<dyn Authenticator>,
        credentials: Arc<dyn CredentialProvider>,
        store: StorageStateStore,
        policy: SessionPolicy,
    ) -> Arc<Self> {
        let slots = (0..size).map(|i| Some(Session::new(SessionId::new(i)))).collect();
        Arc::new(Self {
            pool: Mutex::new(Pool {
                slots,
                states: vec![LoginState::Anonymous; size],
            }),
            available: Notify::new(),
            closing: AtomicBool::new(false),
            authenticator,
            credentials,
            store,
            policy,
        })
    }

    /// Create a pool sized and tuned by the `[sessions]` config.
    pub fn from_config(
        config: &SessionsConfig,
        authenticator: Arc<dyn Authenticator>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Arc<Self> {
        Self::new(
            config.pool_size,
            authenticator,
            credentials,
            StorageStateStore::new(&config.state_dir),
            SessionPolicy::from(config),
        )
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.lock().states.len()
    }

    /// Last known state of every slot.
    pub fn states(&self) -> Vec<LoginState> {
        self.lock().states.clone()
    }

    /// Check out a signed-in session, waiting while all usable ones are busy.
    ///
    /// Sessions that fail to sign in are skipped (and eventually blocked).
    /// Fails with `NoSessionAvailable` once every session is blocked.
    pub async fn acquire(self: &Arc<Self>) -> SessionResult<SessionHandle> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closing.load(Ordering::Acquire) {
                return Err(SessionError::ShuttingDown);
            }

            let picked = {
                let mut pool = self.lock();
                if pool.states.iter().all(|s| s.is_terminal()) {
                    return Err(SessionError::NoSessionAvailable);
                }
                pool.checkout()
            };

            let Some(session) = picked else {
                notified.await;
                continue;
            };

            let mut handle = SessionHandle {
                manager: Arc::clone(self),
                session,
            };
            match self.ensure_active(&mut handle.session).await {
                Ok(()) => {
                    handle.session.last_used = Some(Utc::now());
                    return Ok(handle);
                }
                Err(SessionError::Blocked { session, reason }) => {
                    tracing::warn!("Skipping {}: {}", session, reason);
                }
                Err(SessionError::LoginFailed { session, reason }) => {
                    tracing::warn!("Login failed for {}: {}", session, reason);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Return a session after a fetch, applying what the fetch observed.
    ///
    /// `AuthRequired` expires the session so it re-authenticates before its
    /// next fetch; repeated soft blocks retire it.
    pub async fn release(&self, mut handle: SessionHandle, outcome: &FetchOutcome) {
        let session = &mut handle.session;
        session.last_used = Some(Utc::now());

        match outcome {
            FetchOutcome::Success(_) => session.consecutive_soft_blocks = 0,
            FetchOutcome::HardFailure(_) => {}
            FetchOutcome::AuthRequired => {
                if session.state.is_usable() {
                    match session.apply(SessionEvent::ExpiryDetected) {
                        Ok(()) => tracing::info!(
                            "{} expired; it will sign in again before its next fetch",
                            session.id
                        ),
                        Err(e) => tracing::warn!("{}: {}", session.id, e),
                    }
                }
            }
            FetchOutcome::SoftBlock(reason) => {
                session.consecutive_soft_blocks += 1;
                let count = session.consecutive_soft_blocks;
                if count >= self.policy.soft_block_threshold {
                    let why = format!("{count} consecutive soft blocks (last: {reason})");
                    self.retire(session, &why).await;
                }
            }
        }

        if self.closing.load(Ordering::Acquire) && session.state.is_usable() {
            self.persist(session).await;
        }
    }

    /// Retire a session for good.
    pub async fn invalidate(&self, mut handle: SessionHandle, reason: &str) {
        self.retire(&mut handle.session, reason).await;
    }

    /// Persist the storage state of every idle active session and stop
    /// handing out sessions. Sessions still checked out are persisted when
    /// they are released.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
        self.available.notify_waiters();

        let idle: Vec<Session> = {
            let mut pool = self.lock();
            pool.slots
                .iter_mut()
                .filter(|slot| matches!(slot, Some(s) if s.state.is_usable()))
                .filter_map(Option::take)
                .collect()
        };

        let count = idle.len();
        for mut session in idle {
            match self.authenticator.capture(&session).await {
                Ok(state) if !state.is_empty() => session.storage = state,
                Ok(_) => {}
                Err(e) => tracing::warn!("Could not capture cookies of {}: {}", session.id, e),
            }
            self.persist(&session).await;
            self.check_in(session);
        }
        tracing::info!("Session pool shut down ({} active sessions persisted)", count);
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_in(&self, session: Session) {
        {
            let mut pool = self.lock();
            let slot = session.id.slot();
            pool.states[slot] = session.state;
            pool.slots[slot] = Some(session);
        }
        self.available.notify_waiters();
    }

    async fn ensure_active(&self, session: &mut Session) -> SessionResult<()> {
        match session.state {
            LoginState::Active => Ok(()),
            LoginState::Blocked => Err(SessionError::Blocked {
                session: session.id,
                reason: "session is retired".to_string(),
            }),
            LoginState::Anonymous => {
                if self.try_restore(session).await {
                    Ok(())
                } else {
                    self.login(session).await
                }
            }
            LoginState::Authenticating => {
                // A previous login was abandoned midway
                session.apply(SessionEvent::LoginFailed)?;
                self.login(session).await
            }
            LoginState::Expired => self.login(session).await,
        }
    }

    async fn try_restore(&self, session: &mut Session) -> bool {
        let slot = session.id.slot();
        let state = match self.store.load(slot).await {
            Ok(Some(state)) => state.without_expired(Utc::now()),
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("Ignoring saved state of {}: {}", session.id, e);
                return false;
            }
        };
        if state.is_empty() {
            return false;
        }

        match self.authenticator.restore(session, &state).await {
            Ok(true) => {
                if let Err(e) = session.apply(SessionEvent::Restored) {
                    tracing::warn!("{}: {}", session.id, e);
                    return false;
                }
                session.storage = state;
                tracing::info!("Restored {} from saved storage state", session.id);
                self.persist(session).await;
                true
            }
            Ok(false) => {
                tracing::info!("Saved state of {} is no longer signed in", session.id);
                false
            }
            Err(e) => {
                tracing::warn!("Restoring {} failed: {}", session.id, e);
                false
            }
        }
    }

    async fn login(&self, session: &mut Session) -> SessionResult<()> {
        let credentials = self.credentials.credentials()?;
        session.apply(SessionEvent::BeginLogin)?;
        tracing::info!(
            "Signing in {} as {}",
            session.id,
            credentials.masked_email()
        );

        match self.authenticator.login(session, &credentials).await {
            Ok(LoginOutcome::Authenticated(state)) => {
                session.apply(SessionEvent::LoginSucceeded)?;
                session.storage = state;
                session.failed_logins = 0;
                session.consecutive_soft_blocks = 0;
                tracing::info!("{} is active", session.id);
                self.persist(session).await;
                Ok(())
            }
            Ok(LoginOutcome::Interstitial(interstitial)) => {
                tracing::warn!(
                    "Login for {} stopped at {}; manual intervention needed",
                    session.id,
                    interstitial
                );
                self.record_login_failure(session, &interstitial.to_string())
                    .await;
                Err(SessionError::NeedsManualIntervention {
                    session: session.id,
                    interstitial,
                })
            }
            Ok(LoginOutcome::Rejected(reason)) => self.fail_login(session, reason).await,
            Err(e) => self.fail_login(session, e.to_string()).await,
        }
    }

    async fn fail_login(&self, session: &mut Session, reason: String) -> SessionResult<()> {
        if self.record_login_failure(session, &reason).await {
            Err(SessionError::Blocked {
                session: session.id,
                reason,
            })
        } else {
            Err(SessionError::LoginFailed {
                session: session.id,
                reason,
            })
        }
    }

    /// Count a failed login; returns true when it got the session blocked.
    async fn record_login_failure(&self, session: &mut Session, reason: &str) -> bool {
        if let Err(e) = session.apply(SessionEvent::LoginFailed) {
            tracing::warn!("{}: {}", session.id, e);
        }
        session.failed_logins += 1;

        if session.failed_logins >= self.policy.max_reauth_attempts {
            let why = format!("{} failed logins (last: {reason})", session.failed_logins);
            self.retire(session, &why).await;
            true
        } else {
            false
        }
    }

    async fn retire(&self, session: &mut Session, reason: &str) {
        if session.state.is_terminal() {
            return;
        }
        if let Err(e) = session.apply(SessionEvent::Retire) {
            tracing::warn!("{}: {}", session.id, e);
            return;
        }
        tracing::warn!("Retired {}: {}", session.id, reason);

        if let Err(e) = self.store.remove(session.id.slot()).await {
            tracing::warn!("Could not delete saved state of {}: {}", session.id, e);
        }
        if let Err(e) = self.authenticator.discard(session).await {
            tracing::debug!("Could not discard browser state of {}: {}", session.id, e);
        }
        session.storage = StorageState::default();
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session.id.slot(), &session.storage).await {
            tracing::warn!("Could not persist storage state of {}: {}", session.id, e);
        }
    }
}
