//! Database connection and operations
//!
//! SQLite via sqlx. The same database backs both the catalog rows and the
//! durable job queue, so claim/ack semantics are plain transactional SQL.

pub mod schema;
pub mod transcode_jobs;
pub mod variants;
pub mod videos;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use transcode_jobs::{JobState, TranscodeJobRecord, TranscodeJobRepository};
pub use variants::{VariantOutcome, VariantRepository, VideoVariantRecord};
pub use videos::{CreateVideo, VideoRecord, VideoRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Open (creating if missing) the database file at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database. A single pinned connection keeps the
    /// database alive for the pool's lifetime.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a videos repository
    pub fn videos(&self) -> VideoRepository {
        VideoRepository::new(self.pool.clone())
    }

    /// Get a transcode jobs repository
    pub fn transcode_jobs(&self) -> TranscodeJobRepository {
        TranscodeJobRepository::new(self.pool.clone())
    }

    /// Get a video variants repository
    pub fn variants(&self) -> VariantRepository {
        VariantRepository::new(self.pool.clone())
    }

    /// Create missing tables and indexes
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }
}
