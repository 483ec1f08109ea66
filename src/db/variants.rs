//! Video variants database repository
//!
//! One row per (video, resolution). A variant becomes visible to
//! consumers only once its outcome is `success`; pending rows mark
//! encodes that are in flight (or were interrupted) and are never listed.

use anyhow::Result;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::media::profiles::Resolution;

/// Outcome of one resolution's encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum VariantOutcome {
    Pending,
    Success,
    Failure,
}

/// Video variant record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VideoVariantRecord {
    pub id: Uuid,
    pub video_id: Uuid,
    pub resolution: Resolution,
    pub outcome: VariantOutcome,
    pub output_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub encode_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const VARIANT_COLUMNS: &str = "id, video_id, resolution, outcome, output_path, size_bytes, \
                               encode_ms, last_error, created_at, updated_at";

pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that an encode for this resolution is starting.
    ///
    /// Upserts a pending row; an existing success row is left untouched so
    /// a concurrent or repeated begin can never hide a finished variant.
    pub async fn begin(&self, video_id: Uuid, resolution: Resolution) -> Result<VideoVariantRecord> {
        let now = OffsetDateTime::now_utc();

        let record = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            r#"
            INSERT INTO video_variants (id, video_id, resolution, outcome, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?)
            ON CONFLICT (video_id, resolution) DO UPDATE SET
                outcome = CASE
                    WHEN video_variants.outcome = 'success' THEN 'success'
                    ELSE 'pending'
                END,
                last_error = NULL,
                updated_at = excluded.updated_at
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(video_id)
        .bind(resolution)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Finalize a variant as successfully encoded.
    pub async fn mark_success(
        &self,
        video_id: Uuid,
        resolution: Resolution,
        output_path: &str,
        size_bytes: Option<i64>,
        encode_ms: i64,
    ) -> Result<VideoVariantRecord> {
        let record = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            r#"
            UPDATE video_variants
            SET outcome = 'success', output_path = ?, size_bytes = ?, encode_ms = ?,
                last_error = NULL, updated_at = ?
            WHERE video_id = ? AND resolution = ?
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(output_path)
        .bind(size_bytes)
        .bind(encode_ms)
        .bind(OffsetDateTime::now_utc())
        .bind(video_id)
        .bind(resolution)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Finalize a variant as failed for this resolution.
    pub async fn mark_failure(
        &self,
        video_id: Uuid,
        resolution: Resolution,
        error: &str,
    ) -> Result<VideoVariantRecord> {
        let record = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            r#"
            UPDATE video_variants
            SET outcome = 'failure', last_error = ?, updated_at = ?
            WHERE video_id = ? AND resolution = ?
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(error)
        .bind(OffsetDateTime::now_utc())
        .bind(video_id)
        .bind(resolution)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(
        &self,
        video_id: Uuid,
        resolution: Resolution,
    ) -> Result<Option<VideoVariantRecord>> {
        let record = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM video_variants WHERE video_id = ? AND resolution = ?"
        ))
        .bind(video_id)
        .bind(resolution)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Whether this resolution already has a successful encode. Used to
    /// skip re-encoding on retried jobs.
    pub async fn has_success(&self, video_id: Uuid, resolution: Resolution) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM video_variants
            WHERE video_id = ? AND resolution = ? AND outcome = 'success'
            "#,
        )
        .bind(video_id)
        .bind(resolution)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Successful variants for a video, lowest resolution first.
    pub async fn list_ready(&self, video_id: Uuid) -> Result<Vec<VideoVariantRecord>> {
        let mut records = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM video_variants WHERE video_id = ? AND outcome = 'success'"
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        records.sort_by_key(|r| r.resolution);
        Ok(records)
    }

    /// Every variant row for a video regardless of outcome, lowest
    /// resolution first.
    pub async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<VideoVariantRecord>> {
        let mut records = sqlx::query_as::<_, VideoVariantRecord>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM video_variants WHERE video_id = ?"
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        records.sort_by_key(|r| r.resolution);
        Ok(records)
    }
}
