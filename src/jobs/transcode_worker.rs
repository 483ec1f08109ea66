//! Transcode worker
//!
//! Each worker claims one job at a time and walks the requested ladder
//! lowest resolution first. One resolution failing does not abort the
//! job; a corrupt source does. Resolutions that already have a success
//! variant are skipped, which makes retried jobs idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::db::{Database, TranscodeJobRecord, VideoRecord};
use crate::error::EncodeErrorKind;
use crate::media::encoder::VideoEncoder;
use crate::media::hls;
use crate::media::layout::MediaLayout;
use crate::media::profiles::{Resolution, normalize_ladder};
use crate::services::queue::{NackOutcome, TranscodeQueue};
use crate::status::VideoStatus;

pub struct TranscodeWorker {
    id: String,
    db: Database,
    queue: Arc<TranscodeQueue>,
    encoder: Arc<dyn VideoEncoder>,
    layout: MediaLayout,
    poll_interval: Duration,
    hls_enabled: bool,
}

impl TranscodeWorker {
    pub fn new(
        id: impl Into<String>,
        db: Database,
        queue: Arc<TranscodeQueue>,
        encoder: Arc<dyn VideoEncoder>,
        layout: MediaLayout,
        poll_interval: Duration,
        hls_enabled: bool,
    ) -> Self {
        Self {
            id: id.into(),
            db,
            queue,
            encoder,
            layout,
            poll_interval,
            hls_enabled,
        }
    }

    /// Poll-and-process loop. Runs until the task is aborted.
    pub async fn run(&self) {
        info!(worker = %self.id, "Transcode worker started");

        loop {
            match self.process_next().await {
                // Drained one job, look for the next immediately
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!(worker = %self.id, error = %e, "Worker iteration failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claim and process a single job. Returns false when the queue was
    /// empty.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(job) = self.queue.claim_next(&self.id).await? else {
            return Ok(false);
        };

        self.process_job(&job).await?;
        Ok(true)
    }

    async fn process_job(&self, job: &TranscodeJobRecord) -> Result<()> {
        let Some(video) = self.db.videos().get(job.video_id).await? else {
            warn!(job_id = %job.id, video_id = %job.video_id, "Job references missing video");
            self.queue.nack(job, false, "video row missing").await?;
            return Ok(());
        };

        info!(
            worker = %self.id,
            job_id = %job.id,
            video_id = %video.id,
            title = %video.title,
            attempt = job.attempts,
            "Processing transcode job"
        );

        let source = PathBuf::from(&video.source_path);
        let resolutions = normalize_ladder(&job.resolutions.0);

        let mut corrupt_error: Option<String> = None;

        for resolution in resolutions {
            if self.db.variants().has_success(video.id, resolution).await? {
                debug!(
                    video_id = %video.id,
                    resolution = %resolution,
                    "Variant already encoded, skipping"
                );
                continue;
            }

            self.db.variants().begin(video.id, resolution).await?;

            let dest = self.layout.variant_path(video.id, resolution);
            let started = Instant::now();

            match self
                .encoder
                .encode(&source, &dest, &resolution.profile())
                .await
            {
                Ok(()) => {
                    let encode_ms = started.elapsed().as_millis() as i64;
                    let size_bytes = tokio::fs::metadata(&dest)
                        .await
                        .map(|m| m.len() as i64)
                        .ok();

                    self.db
                        .variants()
                        .mark_success(
                            video.id,
                            resolution,
                            &dest.to_string_lossy(),
                            size_bytes,
                            encode_ms,
                        )
                        .await?;

                    info!(
                        video_id = %video.id,
                        resolution = %resolution,
                        encode_ms,
                        size_bytes = ?size_bytes,
                        "Variant encoded"
                    );

                    if self.hls_enabled {
                        self.publish_hls_rendition(&video, resolution, &dest).await;
                    }
                }
                Err(e) => match e.kind {
                    EncodeErrorKind::SourceCorrupt => {
                        warn!(
                            video_id = %video.id,
                            resolution = %resolution,
                            error = %e,
                            "Source unreadable, aborting remaining resolutions"
                        );
                        self.db
                            .variants()
                            .mark_failure(video.id, resolution, &e.message)
                            .await?;
                        corrupt_error = Some(e.message);
                        break;
                    }
                    EncodeErrorKind::Transient => {
                        warn!(
                            video_id = %video.id,
                            resolution = %resolution,
                            error = %e,
                            "Transient encoder failure"
                        );
                        match self.queue.nack(job, true, &e.message).await? {
                            NackOutcome::Requeued => return Ok(()),
                            NackOutcome::Exhausted | NackOutcome::FailedPermanent => {
                                self.finalize_video(&video).await?;
                                return Ok(());
                            }
                        }
                    }
                    EncodeErrorKind::ResolutionFailed => {
                        warn!(
                            video_id = %video.id,
                            resolution = %resolution,
                            error = %e,
                            "Resolution failed to encode, continuing"
                        );
                        self.db
                            .variants()
                            .mark_failure(video.id, resolution, &e.message)
                            .await?;
                    }
                },
            }
        }

        let ready = self.finalize_video(&video).await?;

        if ready > 0 {
            self.queue.ack(job.id).await?;
        } else {
            let reason = corrupt_error.unwrap_or_else(|| "all resolutions failed".to_string());
            self.queue.nack(job, false, &reason).await?;
        }

        Ok(())
    }

    /// Settle the video's final status from its ready variants: probe
    /// duration and extract the thumbnail on the way into `processed`,
    /// or mark the video `failed` when nothing encoded. Returns the
    /// number of ready variants.
    async fn finalize_video(&self, video: &VideoRecord) -> Result<usize> {
        let ready = self.db.variants().list_ready(video.id).await?;

        if ready.is_empty() {
            self.db
                .videos()
                .transition(video.id, VideoStatus::Failed)
                .await?;
            info!(video_id = %video.id, "Video failed: no resolutions encoded");
            return Ok(0);
        }

        let source = Path::new(&video.source_path);

        let mut duration = match self.encoder.probe_duration(source).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!(video_id = %video.id, error = %e, "Could not probe source duration");
                None
            }
        };
        if duration.is_none() {
            // Fall back to a successful variant
            if let Some(path) = ready.first().and_then(|v| v.output_path.clone()) {
                duration = self.encoder.probe_duration(Path::new(&path)).await.ok();
            }
        }

        let thumb_path = self.layout.thumbnail_path(video.id);
        let thumbnail = match self.encoder.extract_thumbnail(source, &thumb_path).await {
            Ok(()) => Some(thumb_path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(video_id = %video.id, error = %e, "Could not extract thumbnail");
                None
            }
        };

        self.db
            .videos()
            .finalize_processed(video.id, duration, thumbnail.as_deref())
            .await?;

        let labels: Vec<Resolution> = ready.iter().map(|v| v.resolution).collect();
        info!(
            video_id = %video.id,
            ready = ?labels,
            duration_secs = ?duration,
            "Video processed"
        );

        Ok(ready.len())
    }

    /// Best-effort HLS publishing: segment the fresh variant and rewrite
    /// the master playlist over everything ready so far. Never affects
    /// the job outcome.
    async fn publish_hls_rendition(
        &self,
        video: &VideoRecord,
        resolution: Resolution,
        variant_path: &Path,
    ) {
        let rendition_dir = self.layout.hls_variant_dir(video.id, resolution);
        if let Err(e) = self.encoder.package_hls(variant_path, &rendition_dir).await {
            warn!(
                video_id = %video.id,
                resolution = %resolution,
                error = %e,
                "HLS rendition packaging failed"
            );
            return;
        }

        let ready = match self.db.variants().list_ready(video.id).await {
            Ok(list) => list.iter().map(|v| v.resolution).collect::<Vec<_>>(),
            Err(e) => {
                warn!(video_id = %video.id, error = %e, "Could not list ready variants for playlist");
                return;
            }
        };

        let master = self.layout.master_playlist_path(video.id);
        if let Err(e) = hls::write_master_playlist(&master, &ready).await {
            warn!(video_id = %video.id, error = %e, "Could not write master playlist");
        }
    }
}
