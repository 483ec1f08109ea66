//! Transcode job queue
//!
//! Durable hand-off between upload completion and the transcode workers.
//! Job-state changes are always paired with the matching video status
//! transition; the guarded transitions keep a misbehaving caller from
//! bending the lifecycle.

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{Database, TranscodeJobRecord};
use crate::error::PipelineError;
use crate::media::profiles::{Resolution, normalize_ladder};
use crate::status::VideoStatus;

/// What happened to a nacked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Back in the queue for another attempt.
    Requeued,
    /// Requeue requested but the attempt budget is spent; job is failed.
    Exhausted,
    /// Terminal failure as requested.
    FailedPermanent,
}

pub struct TranscodeQueue {
    db: Database,
    lease: time::Duration,
    max_attempts: i64,
}

impl TranscodeQueue {
    pub fn new(db: Database, lease_secs: u64, max_attempts: u32) -> Self {
        Self {
            db,
            lease: time::Duration::seconds(lease_secs as i64),
            max_attempts: i64::from(max_attempts),
        }
    }

    /// Enqueue a transcode job for a video.
    ///
    /// Fails with [`PipelineError::DuplicateJob`] when an active job
    /// already exists, and with `InvalidTransition` when the video is not
    /// in a state that can be queued (`uploaded` or `failed`). An empty
    /// resolution set requests the full ladder.
    pub async fn enqueue(
        &self,
        video_id: Uuid,
        resolutions: &[Resolution],
    ) -> Result<TranscodeJobRecord, PipelineError> {
        let ladder = if resolutions.is_empty() {
            Resolution::LADDER.to_vec()
        } else {
            normalize_ladder(resolutions)
        };

        let job = self.db.transcode_jobs().create(video_id, &ladder).await?;

        match self
            .db
            .videos()
            .transition(video_id, VideoStatus::Queued)
            .await
        {
            Ok(_) => {
                debug!(video_id = %video_id, job_id = %job.id, resolutions = ?ladder, "Job enqueued");
                Ok(job)
            }
            Err(e) => {
                // The job row must not outlive a rejected enqueue
                if let Err(cleanup) = self.db.transcode_jobs().delete(job.id).await {
                    warn!(job_id = %job.id, error = %cleanup, "Failed to roll back rejected job");
                }
                Err(e)
            }
        }
    }

    /// Manual retry of a failed video. Reuses the resolution set of the
    /// most recent job when one exists.
    pub async fn retry(&self, video_id: Uuid) -> Result<TranscodeJobRecord, PipelineError> {
        let previous = self.db.transcode_jobs().latest_for_video(video_id).await?;

        let resolutions = previous.map(|j| j.resolutions.0).unwrap_or_default();
        self.enqueue(video_id, &resolutions).await
    }

    /// Claim the next queued job for a worker, transitioning its video to
    /// `processing`. Returns `None` when the queue is empty.
    pub async fn claim_next(&self, worker: &str) -> Result<Option<TranscodeJobRecord>> {
        loop {
            let Some(job) = self
                .db
                .transcode_jobs()
                .claim_next(worker, self.lease)
                .await?
            else {
                return Ok(None);
            };

            match self
                .db
                .videos()
                .transition(job.video_id, VideoStatus::Processing)
                .await
            {
                Ok(_) => {
                    debug!(
                        worker,
                        job_id = %job.id,
                        video_id = %job.video_id,
                        attempt = job.attempts,
                        "Claimed transcode job"
                    );
                    return Ok(Some(job));
                }
                Err(e) => {
                    // Job row and video row disagree; park the job rather
                    // than spin on it
                    warn!(
                        job_id = %job.id,
                        video_id = %job.video_id,
                        error = %e,
                        "Claimed job whose video cannot enter processing, failing job"
                    );
                    self.db
                        .transcode_jobs()
                        .mark_failed(job.id, &format!("video status conflict: {e}"))
                        .await?;
                }
            }
        }
    }

    /// Terminal success for a job.
    pub async fn ack(&self, job_id: Uuid) -> Result<(), PipelineError> {
        self.db.transcode_jobs().ack(job_id).await
    }

    /// Report a failed job: requeue (within the attempt budget) or fail
    /// terminally. Requeueing returns the video to `queued`.
    pub async fn nack(
        &self,
        job: &TranscodeJobRecord,
        requeue: bool,
        error: &str,
    ) -> Result<NackOutcome, PipelineError> {
        if requeue && job.attempts < self.max_attempts {
            self.db.transcode_jobs().requeue(job.id, error).await?;
            self.db
                .videos()
                .transition(job.video_id, VideoStatus::Queued)
                .await?;
            debug!(job_id = %job.id, attempt = job.attempts, "Job requeued");
            return Ok(NackOutcome::Requeued);
        }

        self.db.transcode_jobs().mark_failed(job.id, error).await?;
        Ok(if requeue {
            warn!(
                job_id = %job.id,
                attempts = job.attempts,
                "Attempt budget exhausted, job failed"
            );
            NackOutcome::Exhausted
        } else {
            NackOutcome::FailedPermanent
        })
    }

    /// Requeue all jobs whose lease has expired (crashed or wedged
    /// worker). Returns the number of reclaimed jobs.
    pub async fn reclaim_expired(&self) -> Result<u64> {
        let reclaimed = self.db.transcode_jobs().reclaim_expired().await?;
        let count = reclaimed.len() as u64;

        for job in reclaimed {
            warn!(
                job_id = %job.id,
                video_id = %job.video_id,
                claimed_by = ?job.claimed_by,
                "Reclaimed job with expired lease"
            );
            if let Err(e) = self
                .db
                .videos()
                .transition(job.video_id, VideoStatus::Queued)
                .await
            {
                warn!(video_id = %job.video_id, error = %e, "Could not requeue video for reclaimed job");
            }
        }

        Ok(count)
    }
}
