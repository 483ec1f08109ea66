//! Videos database repository
//!
//! Holds the processing-facing fields of a video (status, duration,
//! thumbnail). Status writes always go through the state machine guard;
//! the SQL additionally re-checks the expected current status so a
//! concurrent writer cannot slip an invalid transition through.

use anyhow::Result;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::status::VideoStatus;

/// Video record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VideoRecord {
    pub id: Uuid,
    pub title: String,
    pub source_path: String,
    pub status: VideoStatus,
    pub duration_secs: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Input for registering an uploaded video
#[derive(Debug)]
pub struct CreateVideo {
    pub id: Uuid,
    pub title: String,
    pub source_path: String,
}

pub struct VideoRepository {
    pool: SqlitePool,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a freshly uploaded video in `uploaded` state.
    pub async fn create(&self, input: CreateVideo) -> Result<VideoRecord> {
        let now = OffsetDateTime::now_utc();

        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            INSERT INTO videos (id, title, source_path, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, title, source_path, status, duration_secs, thumbnail_path,
                      created_at, updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.title)
        .bind(&input.source_path)
        .bind(VideoStatus::Uploaded)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<VideoRecord>> {
        Ok(self.fetch(id).await?)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<VideoRecord>, sqlx::Error> {
        sqlx::query_as::<_, VideoRecord>(
            r#"
            SELECT id, title, source_path, status, duration_secs, thumbnail_path,
                   created_at, updated_at
            FROM videos
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_by_status(&self, status: VideoStatus) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<_, VideoRecord>(
            r#"
            SELECT id, title, source_path, status, duration_secs, thumbnail_path,
                   created_at, updated_at
            FROM videos
            WHERE status = ?
            ORDER BY created_at
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Apply a guarded status transition.
    ///
    /// The update only matches when the row still holds the status the
    /// transition was validated against, so concurrent writers fail loudly
    /// instead of clobbering each other.
    pub async fn transition(
        &self,
        id: Uuid,
        to: VideoStatus,
    ) -> Result<VideoRecord, PipelineError> {
        let current = self
            .fetch(id)
            .await?
            .ok_or(PipelineError::VideoNotFound(id))?;

        current.status.transition(to)?;

        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            UPDATE videos
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING id, title, source_path, status, duration_secs, thumbnail_path,
                      created_at, updated_at
            "#,
        )
        .bind(to)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(current.status)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(PipelineError::InvalidTransition {
            from: current.status,
            to,
        })
    }

    /// Transition `processing -> processed`, stamping duration and
    /// thumbnail in the same write. These fields are only ever set here.
    pub async fn finalize_processed(
        &self,
        id: Uuid,
        duration_secs: Option<f64>,
        thumbnail_path: Option<&str>,
    ) -> Result<VideoRecord, PipelineError> {
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            UPDATE videos
            SET status = ?, duration_secs = ?, thumbnail_path = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING id, title, source_path, status, duration_secs, thumbnail_path,
                      created_at, updated_at
            "#,
        )
        .bind(VideoStatus::Processed)
        .bind(duration_secs)
        .bind(thumbnail_path)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(VideoStatus::Processing)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => Ok(record),
            None => {
                let current = self
                    .fetch(id)
                    .await?
                    .ok_or(PipelineError::VideoNotFound(id))?;
                Err(PipelineError::InvalidTransition {
                    from: current.status,
                    to: VideoStatus::Processed,
                })
            }
        }
    }
}
