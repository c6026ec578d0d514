//! `SQLite` connection pool.

use crate::error::{DatabaseError, Result};
use crate::migrations;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Migrated `SQLite` database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if missing) the database file at `path` and apply
    /// pending migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the file cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Database opened at {}", path.display());
        Self::migrated(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be created or migrated.
    pub async fn in_memory() -> Result<Self> {
        let in_memory = |e: sqlx::Error| DatabaseError::Open {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        };
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(in_memory)?;
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(in_memory)?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: Pool<Sqlite>) -> Result<Self> {
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying `SQLx` pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}
