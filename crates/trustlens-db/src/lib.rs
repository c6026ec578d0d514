//! Trustlens Review Archive
//!
//! Keeps every scored review-page capture so later scrapes of the same
//! product can compare against its history.
//!
//! # Architecture
//!
//! - **Archive trait**: the scheduler only sees [`ReviewArchive`]
//! - **Storage**: `SQLite` through `SQLx`, with embedded migrations
//! - **Encoding**: snapshots and assessments are stored as JSON, with the
//!   target and score broken out into columns for lookup
//!
//! # Example
//!
//! ```ignore
//! use trustlens_db::{Database, ReviewArchive, SqliteArchive};
//!
//! let db = Database::open("trustlens.db").await?;
//! let archive = SqliteArchive::new(db);
//! let history = archive.load_history(&target, 30).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod archive;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod scrapes;

// Re-export commonly used types
pub use archive::{MemoryArchive, ReviewArchive, ScrapeRecord, SqliteArchive};
pub use connection::Database;
pub use error::{DatabaseError, Result};
