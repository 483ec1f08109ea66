//! Transcode jobs database repository
//!
//! Durable work queue backing. A partial unique index on (video_id) over
//! the active states enforces at most one queued/processing job per video;
//! claims are a single guarded UPDATE so two workers can never take the
//! same job. Terminal jobs are archived in place, which keeps rowid a
//! faithful FIFO ordering for the active queue.

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::media::profiles::Resolution;

/// Queue state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

/// Transcode job record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TranscodeJobRecord {
    pub id: Uuid,
    pub video_id: Uuid,
    pub resolutions: Json<Vec<Resolution>>,
    pub state: JobState,
    pub attempts: i64,
    pub claimed_by: Option<String>,
    pub lease_expires_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub enqueued_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

const JOB_COLUMNS: &str = "id, video_id, resolutions, state, attempts, claimed_by, \
                           lease_expires_at, last_error, enqueued_at, finished_at";

pub struct TranscodeJobRepository {
    pool: SqlitePool,
}

impl TranscodeJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a queued job for a video.
    ///
    /// Fails with [`PipelineError::DuplicateJob`] when an active job
    /// already exists (unique index violation).
    pub async fn create(
        &self,
        video_id: Uuid,
        resolutions: &[Resolution],
    ) -> Result<TranscodeJobRecord, PipelineError> {
        let result = sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            r#"
            INSERT INTO transcode_jobs (id, video_id, resolutions, state, attempts, enqueued_at)
            VALUES (?, ?, ?, ?, 0, ?)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(video_id)
        .bind(Json(resolutions.to_vec()))
        .bind(JobState::Queued)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await;

        result.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation => {
                PipelineError::DuplicateJob(video_id)
            }
            _ => PipelineError::Database(e),
        })
    }

    /// Remove a job row. Only used to roll back an enqueue whose video
    /// status update was rejected; terminal jobs stay archived.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM transcode_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<TranscodeJobRecord>> {
        let record = sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM transcode_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// The active (queued or processing) job for a video, if any.
    pub async fn active_for_video(&self, video_id: Uuid) -> Result<Option<TranscodeJobRecord>> {
        let record = sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM transcode_jobs
            WHERE video_id = ? AND state IN ('queued', 'processing')
            "#
        ))
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// The most recently enqueued job for a video regardless of state.
    pub async fn latest_for_video(
        &self,
        video_id: Uuid,
    ) -> Result<Option<TranscodeJobRecord>, sqlx::Error> {
        sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM transcode_jobs
            WHERE video_id = ?
            ORDER BY rowid DESC
            LIMIT 1
            "#
        ))
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically claim the oldest queued job: mark it processing, stamp
    /// the lease expiry, record the claiming worker, and count the
    /// attempt. Returns `None` when the queue is empty.
    pub async fn claim_next(
        &self,
        worker: &str,
        lease: time::Duration,
    ) -> Result<Option<TranscodeJobRecord>> {
        let record = sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            r#"
            UPDATE transcode_jobs
            SET state = 'processing',
                claimed_by = ?,
                lease_expires_at = ?,
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM transcode_jobs
                WHERE state = 'queued'
                ORDER BY rowid
                LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker)
        .bind(OffsetDateTime::now_utc() + lease)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Mark a processing job as terminally succeeded.
    pub async fn ack(&self, id: Uuid) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET state = 'done', claimed_by = NULL, lease_expires_at = NULL, finished_at = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::JobNotFound(id));
        }

        Ok(())
    }

    /// Mark a processing job as terminally failed.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET state = 'failed', claimed_by = NULL, lease_expires_at = NULL,
                last_error = ?, finished_at = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(error)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::JobNotFound(id));
        }

        Ok(())
    }

    /// Put a processing job back in the queue (transient failure).
    pub async fn requeue(&self, id: Uuid, error: &str) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET state = 'queued', claimed_by = NULL, lease_expires_at = NULL, last_error = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::JobNotFound(id));
        }

        Ok(())
    }

    /// Requeue every processing job whose lease has expired and return
    /// the reclaimed jobs. This is what recovers work from crashed
    /// workers.
    pub async fn reclaim_expired(&self) -> Result<Vec<TranscodeJobRecord>> {
        let records = sqlx::query_as::<_, TranscodeJobRecord>(&format!(
            r#"
            UPDATE transcode_jobs
            SET state = 'queued', claimed_by = NULL, lease_expires_at = NULL,
                last_error = 'lease expired'
            WHERE state = 'processing' AND lease_expires_at < ?
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(OffsetDateTime::now_utc())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
