//! Variant registry
//!
//! Read surface for "which resolutions exist and are ready", consumed by
//! the streaming/API layer. A missing variant is a normal answer
//! ("unavailable"), never a fault.

use anyhow::Result;
use uuid::Uuid;

use crate::db::{Database, VariantOutcome, VideoVariantRecord};
use crate::error::PipelineError;
use crate::media::profiles::Resolution;
use crate::status::VideoStatus;

/// Processing summary for one video.
#[derive(Debug, Clone)]
pub struct ProcessingProgress {
    pub status: VideoStatus,
    /// Resolutions the most recent job asked for (full ladder when the
    /// video has never been enqueued).
    pub requested: Vec<Resolution>,
    pub ready: Vec<Resolution>,
    pub failed: Vec<Resolution>,
}

impl ProcessingProgress {
    pub fn percent_ready(&self) -> f64 {
        if self.requested.is_empty() {
            return 0.0;
        }
        (self.ready.len() as f64 / self.requested.len() as f64) * 100.0
    }
}

pub struct VariantRegistry {
    db: Database,
}

impl VariantRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ready (successfully encoded) variants, lowest resolution first.
    pub async fn list_ready(&self, video_id: Uuid) -> Result<Vec<VideoVariantRecord>> {
        self.db.variants().list_ready(video_id).await
    }

    /// One ready variant, or `None` when that resolution failed, is still
    /// encoding, or was never attempted. Only successful encodes are ever
    /// visible here.
    pub async fn get(
        &self,
        video_id: Uuid,
        resolution: Resolution,
    ) -> Result<Option<VideoVariantRecord>> {
        let variant = self.db.variants().get(video_id, resolution).await?;
        Ok(variant.filter(|v| v.outcome == VariantOutcome::Success))
    }

    /// Summary of how far processing has come for a video.
    pub async fn progress(&self, video_id: Uuid) -> Result<ProcessingProgress> {
        let video = self
            .db
            .videos()
            .get(video_id)
            .await?
            .ok_or(PipelineError::VideoNotFound(video_id))?;

        let requested = self
            .db
            .transcode_jobs()
            .latest_for_video(video_id)
            .await?
            .map(|j| j.resolutions.0)
            .unwrap_or_else(|| Resolution::LADDER.to_vec());

        let variants = self.db.variants().list_for_video(video_id).await?;

        let ready = variants
            .iter()
            .filter(|v| v.outcome == VariantOutcome::Success)
            .map(|v| v.resolution)
            .collect();
        let failed = variants
            .iter()
            .filter(|v| v.outcome == VariantOutcome::Failure)
            .map(|v| v.resolution)
            .collect();

        Ok(ProcessingProgress {
            status: video.status,
            requested,
            ready,
            failed,
        })
    }
}
