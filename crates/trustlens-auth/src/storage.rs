//! Durable storage-state (cookie) persistence.
//!
//! Each session slot owns one JSON file, `session-<slot>.json`, under the
//! configured state directory. Files are written to a temporary sibling and
//! renamed into place so a crash never leaves a truncated state behind.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie is scoped to
    pub domain: String,
    /// Path the cookie is scoped to
    pub path: String,
    /// Expiry as seconds since the Unix epoch; `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// `HttpOnly` flag
    #[serde(default)]
    pub http_only: bool,
    /// `Secure` flag
    #[serde(default)]
    pub secure: bool,
}

impl StoredCookie {
    /// Whether the cookie has expired at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_some_and(|expires| expires > 0.0 && expires < now.timestamp() as f64)
    }
}

/// Cookies of an authenticated browsing context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageState {
    /// Cookies in capture order
    pub cookies: Vec<StoredCookie>,
    /// When the state was captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StorageState {
    /// Create a state captured now.
    #[must_use]
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            cookies,
            saved_at: Some(Utc::now()),
        }
    }

    /// Whether there is nothing worth restoring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Drop cookies that have expired at `now`.
    #[must_use]
    pub fn without_expired(mut self, now: DateTime<Utc>) -> Self {
        self.cookies.retain(|cookie| !cookie.is_expired(now));
        self
    }
}

/// Directory of per-slot storage-state files.
#[derive(Debug, Clone)]
pub struct StorageStateStore {
    dir: PathBuf,
}

impl StorageStateStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a session slot.
    #[must_use]
    pub fn path_for(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("session-{slot}.json"))
    }

    /// Persist the state for a slot.
    pub async fn save(&self, slot: usize, state: &StorageState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AuthError::StorageIo {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path_for(slot);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| AuthError::StorageIo {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| AuthError::StorageIo {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            "Saved storage state for session {} ({} cookies)",
            slot,
            state.cookies.len()
        );
        Ok(())
    }

    /// Load the state for a slot, or `None` if nothing was saved.
    pub async fn load(&self, slot: usize) -> Result<Option<StorageState>> {
        let path = self.path_for(slot);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AuthError::StorageIo { path, source }),
        }
    }

    /// Delete the state for a slot. Missing files are ignored.
    pub async fn remove(&self, slot: usize) -> Result<()> {
        let path = self.path_for(slot);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthError::StorageIo { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn cookie(name: &str, expires: Option<f64>) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            expires,
            http_only: true,
            secure: true,
        }
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let tmp = TempDir::new().expect("create temp dir");
        let store = StorageStateStore::new(tmp.path().join("sessions"));

        assert!(store.load(0).await.expect("load missing").is_none());

        let state = StorageState::new(vec![cookie("session-id", None)]);
        store.save(0, &state).await.expect("save state");
        assert!(store.path_for(0).exists());

        let loaded = store.load(0).await.expect("load state").expect("state present");
        assert_eq!(loaded, state);

        store.remove(0).await.expect("remove state");
        store.remove(0).await.expect("remove twice");
        assert!(store.load(0).await.expect("load removed").is_none());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let store = StorageStateStore::new(tmp.path());
        std::fs::write(store.path_for(1), b"{not json").expect("write garbage");

        assert!(matches!(
            store.load(1).await,
            Err(AuthError::StorageFormat(_))
        ));
    }

    #[test]
    fn test_without_expired() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        let past = (now.timestamp() - 60) as f64;
        let future = (now.timestamp() + 3600) as f64;
        let state = StorageState::new(vec![
            cookie("old", Some(past)),
            cookie("fresh", Some(future)),
            cookie("session", None),
        ])
        .without_expired(now);

        let names: Vec<_> = state.cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fresh", "session"]);
    }

    #[test]
    fn test_cookie_json_shape() {
        let json = serde_json::to_string(&cookie("a", None)).expect("serialize cookie");
        assert!(json.contains("\"httpOnly\":true"));
        assert!(!json.contains("expires"));
    }
}
