//! Runtime schema synchronization
//!
//! Creates missing tables and indexes at startup. Column renames and type
//! changes are not handled (requires a DB wipe).

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Table definitions, created in order.
const TABLES: &[(&str, &str)] = &[
    (
        "videos",
        r#"
        CREATE TABLE videos (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            source_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            duration_secs REAL,
            thumbnail_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "transcode_jobs",
        r#"
        CREATE TABLE transcode_jobs (
            id TEXT PRIMARY KEY NOT NULL,
            video_id TEXT NOT NULL REFERENCES videos(id),
            resolutions TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'queued',
            attempts INTEGER NOT NULL DEFAULT 0,
            claimed_by TEXT,
            lease_expires_at TEXT,
            last_error TEXT,
            enqueued_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    ),
    (
        "video_variants",
        r#"
        CREATE TABLE video_variants (
            id TEXT PRIMARY KEY NOT NULL,
            video_id TEXT NOT NULL REFERENCES videos(id),
            resolution TEXT NOT NULL,
            outcome TEXT NOT NULL DEFAULT 'pending',
            output_path TEXT,
            size_bytes INTEGER,
            encode_ms INTEGER,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (video_id, resolution)
        )
        "#,
    ),
];

/// Index definitions. The partial unique index on transcode_jobs is what
/// enforces "at most one active job per video" at the storage layer.
const INDEXES: &[&str] = &[
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_transcode_jobs_active_video
    ON transcode_jobs (video_id)
    WHERE state = 'queued' OR state = 'processing'
    "#,
    "CREATE INDEX IF NOT EXISTS idx_transcode_jobs_state ON transcode_jobs (state)",
    "CREATE INDEX IF NOT EXISTS idx_video_variants_video ON video_variants (video_id)",
    "CREATE INDEX IF NOT EXISTS idx_videos_status ON videos (status)",
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Bring the database schema up to date.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for (table_name, create_sql) in TABLES {
        if table_exists(pool, table_name).await? {
            debug!(table = table_name, "Table already exists");
            continue;
        }

        sqlx::query(create_sql).execute(pool).await?;
        info!("Created table: {}", table_name);
    }

    for index_sql in INDEXES {
        sqlx::query(index_sql).execute(pool).await?;
    }

    Ok(())
}
