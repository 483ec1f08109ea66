//! Integration tests for the transcoding pipeline
//!
//! These drive the real queue, worker, and registry against an in-memory
//! database with a scriptable mock encoder:
//! - enqueue/claim/ack semantics and the one-active-job invariant
//! - partial and total encode failure handling
//! - idempotent retry (no re-encoding of finished variants)
//! - lease-timeout crash recovery
//! - ingest of uploaded files

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use projectionist::db::{CreateVideo, Database, JobState, VariantOutcome};
use projectionist::error::{EncodeError, PipelineError};
use projectionist::jobs::transcode_worker::TranscodeWorker;
use projectionist::media::encoder::VideoEncoder;
use projectionist::media::layout::MediaLayout;
use projectionist::media::profiles::{EncodeProfile, Resolution};
use projectionist::services::{IngestService, TranscodeQueue, VariantRegistry};
use projectionist::status::VideoStatus;

// ============================================================================
// Test harness
// ============================================================================

/// What the mock encoder should do for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockBehavior {
    Succeed,
    FailResolution,
    Corrupt,
    Transient,
}

/// Scriptable encoder: writes placeholder output files on success and
/// counts encode invocations per resolution.
struct MockEncoder {
    behaviors: Mutex<HashMap<Resolution, MockBehavior>>,
    encode_calls: Mutex<HashMap<Resolution, usize>>,
    duration_secs: f64,
}

impl MockEncoder {
    fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            encode_calls: Mutex::new(HashMap::new()),
            duration_secs: 12.5,
        }
    }

    fn set_behavior(&self, resolution: Resolution, behavior: MockBehavior) {
        self.behaviors.lock().unwrap().insert(resolution, behavior);
    }

    fn encode_calls(&self, resolution: Resolution) -> usize {
        *self
            .encode_calls
            .lock()
            .unwrap()
            .get(&resolution)
            .unwrap_or(&0)
    }
}

#[async_trait]
impl VideoEncoder for MockEncoder {
    async fn encode(
        &self,
        _source: &Path,
        dest: &Path,
        profile: &EncodeProfile,
    ) -> Result<(), EncodeError> {
        let resolution = profile.resolution;
        *self
            .encode_calls
            .lock()
            .unwrap()
            .entry(resolution)
            .or_insert(0) += 1;

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&resolution)
            .copied()
            .unwrap_or(MockBehavior::Succeed);

        match behavior {
            MockBehavior::Succeed => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await.unwrap();
                }
                tokio::fs::write(dest, b"encoded").await.unwrap();
                Ok(())
            }
            MockBehavior::FailResolution => {
                Err(EncodeError::resolution_failed("mock encode failure"))
            }
            MockBehavior::Corrupt => Err(EncodeError::source_corrupt(
                "Invalid data found when processing input",
            )),
            MockBehavior::Transient => Err(EncodeError::transient("No space left on device")),
        }
    }

    async fn probe_duration(&self, _source: &Path) -> Result<f64, EncodeError> {
        Ok(self.duration_secs)
    }

    async fn extract_thumbnail(&self, _source: &Path, dest: &Path) -> Result<(), EncodeError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(dest, b"png").await.unwrap();
        Ok(())
    }

    async fn package_hls(&self, _variant: &Path, dest_dir: &Path) -> Result<PathBuf, EncodeError> {
        tokio::fs::create_dir_all(dest_dir).await.unwrap();
        let playlist = dest_dir.join("index.m3u8");
        tokio::fs::write(&playlist, b"#EXTM3U\n").await.unwrap();
        Ok(playlist)
    }
}

struct Harness {
    db: Database,
    queue: Arc<TranscodeQueue>,
    encoder: Arc<MockEncoder>,
    worker: TranscodeWorker,
    layout: MediaLayout,
    _media_dir: tempfile::TempDir,
}

/// Pipeline wired against an in-memory database and a temp media root.
async fn harness_with(lease_secs: u64, max_attempts: u32, hls_enabled: bool) -> Harness {
    let db = Database::connect_in_memory().await.unwrap();
    db.ensure_schema().await.unwrap();

    let media_dir = tempfile::tempdir().unwrap();
    let layout = MediaLayout::new(media_dir.path());
    let queue = Arc::new(TranscodeQueue::new(db.clone(), lease_secs, max_attempts));
    let encoder = Arc::new(MockEncoder::new());

    let worker = TranscodeWorker::new(
        "worker-1",
        db.clone(),
        queue.clone(),
        encoder.clone(),
        layout.clone(),
        Duration::from_millis(10),
        hls_enabled,
    );

    Harness {
        db,
        queue,
        encoder,
        worker,
        layout,
        _media_dir: media_dir,
    }
}

async fn harness() -> Harness {
    harness_with(600, 3, false).await
}

async fn seed_video(db: &Database, title: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.videos()
        .create(CreateVideo {
            id,
            title: title.to_string(),
            source_path: format!("/tmp/sources/{id}/source.mp4"),
        })
        .await
        .unwrap();
    id
}

async fn video_status(db: &Database, id: Uuid) -> VideoStatus {
    db.videos().get(id).await.unwrap().unwrap().status
}

async fn ready_labels(db: &Database, id: Uuid) -> Vec<Resolution> {
    db.variants()
        .list_ready(id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.resolution)
        .collect()
}

// ============================================================================
// Queue semantics
// ============================================================================

#[tokio::test]
async fn test_enqueue_transitions_video_to_queued() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Upload").await;

    let job = h.queue.enqueue(video_id, &[]).await.unwrap();

    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.resolutions.0, Resolution::LADDER.to_vec());
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Queued);
}

#[tokio::test]
async fn test_duplicate_enqueue_rejected() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Upload").await;

    h.queue.enqueue(video_id, &[]).await.unwrap();
    let err = h.queue.enqueue(video_id, &[]).await.unwrap_err();

    assert_matches!(err, PipelineError::DuplicateJob(id) if id == video_id);

    // The first job is untouched
    let active = h
        .db
        .transcode_jobs()
        .active_for_video(video_id)
        .await
        .unwrap();
    assert!(active.is_some());
}

#[tokio::test]
async fn test_enqueue_unknown_video_rejected() {
    let h = harness().await;

    let err = h.queue.enqueue(Uuid::new_v4(), &[]).await.unwrap_err();
    assert_matches!(err, PipelineError::VideoNotFound(_));
}

#[tokio::test]
async fn test_claim_is_fifo_and_stamps_lease() {
    let h = harness().await;
    let first = seed_video(&h.db, "First").await;
    let second = seed_video(&h.db, "Second").await;

    h.queue.enqueue(first, &[]).await.unwrap();
    h.queue.enqueue(second, &[]).await.unwrap();

    let job_a = h.queue.claim_next("worker-a").await.unwrap().unwrap();
    assert_eq!(job_a.video_id, first);
    assert_eq!(job_a.state, JobState::Processing);
    assert_eq!(job_a.attempts, 1);
    assert_eq!(job_a.claimed_by.as_deref(), Some("worker-a"));
    assert!(job_a.lease_expires_at.is_some());
    assert_eq!(video_status(&h.db, first).await, VideoStatus::Processing);

    let job_b = h.queue.claim_next("worker-b").await.unwrap().unwrap();
    assert_eq!(job_b.video_id, second);

    // Queue drained
    assert!(h.queue.claim_next("worker-a").await.unwrap().is_none());
}

// ============================================================================
// Worker outcomes
// ============================================================================

#[tokio::test]
async fn test_partial_failure_still_processes_video() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Partial").await;

    // 480p and 1080p fail, the rest succeed
    h.encoder
        .set_behavior(Resolution::P480, MockBehavior::FailResolution);
    h.encoder
        .set_behavior(Resolution::P1080, MockBehavior::FailResolution);

    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Processed);
    assert_eq!(
        ready_labels(&h.db, video_id).await,
        vec![Resolution::P120, Resolution::P360, Resolution::P720]
    );

    // Failed resolutions are recorded, not erased
    for res in [Resolution::P480, Resolution::P1080] {
        let variant = h.db.variants().get(video_id, res).await.unwrap().unwrap();
        assert_eq!(variant.outcome, VariantOutcome::Failure);
        assert!(variant.last_error.is_some());
    }

    let video = h.db.videos().get(video_id).await.unwrap().unwrap();
    assert_eq!(video.duration_secs, Some(12.5));
    assert!(video.thumbnail_path.is_some());

    let job = h
        .db
        .transcode_jobs()
        .latest_for_video(video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.state, JobState::Done);
}

#[tokio::test]
async fn test_corrupt_source_fails_video_and_stops_ladder() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Corrupt").await;

    h.encoder
        .set_behavior(Resolution::P120, MockBehavior::Corrupt);

    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Failed);
    assert_eq!(ready_labels(&h.db, video_id).await, Vec::<Resolution>::new());

    // Only the first resolution was ever attempted
    assert_eq!(h.encoder.encode_calls(Resolution::P120), 1);
    for res in [
        Resolution::P360,
        Resolution::P480,
        Resolution::P720,
        Resolution::P1080,
    ] {
        assert_eq!(h.encoder.encode_calls(res), 0);
        assert!(h.db.variants().get(video_id, res).await.unwrap().is_none());
    }

    let job = h
        .db
        .transcode_jobs()
        .latest_for_video(video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.state, JobState::Failed);
}

#[tokio::test]
async fn test_transient_failure_requeues_and_retry_skips_done_variants() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Flaky").await;

    // First attempt: two variants land, then the encoder goes away
    h.encoder
        .set_behavior(Resolution::P480, MockBehavior::Transient);

    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Queued);
    assert_eq!(
        ready_labels(&h.db, video_id).await,
        vec![Resolution::P120, Resolution::P360]
    );
    let job = h
        .db
        .transcode_jobs()
        .latest_for_video(video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.state, JobState::Queued);

    // Encoder recovers; the retried job must not re-encode finished work
    h.encoder
        .set_behavior(Resolution::P480, MockBehavior::Succeed);
    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Processed);
    assert_eq!(ready_labels(&h.db, video_id).await, Resolution::LADDER.to_vec());
    assert_eq!(h.encoder.encode_calls(Resolution::P120), 1);
    assert_eq!(h.encoder.encode_calls(Resolution::P360), 1);
    assert_eq!(h.encoder.encode_calls(Resolution::P480), 2);
}

#[tokio::test]
async fn test_transient_exhaustion_fails_video_without_variants() {
    // One attempt only
    let h = harness_with(600, 1, false).await;
    let video_id = seed_video(&h.db, "Hopeless").await;

    for res in Resolution::LADDER {
        h.encoder.set_behavior(res, MockBehavior::Transient);
    }

    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Failed);
    assert_eq!(ready_labels(&h.db, video_id).await, Vec::<Resolution>::new());

    let job = h
        .db
        .transcode_jobs()
        .latest_for_video(video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.state, JobState::Failed);

    // The interrupted variant stays pending and invisible, never failed
    let variant = h
        .db
        .variants()
        .get(video_id, Resolution::P120)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.outcome, VariantOutcome::Pending);
}

#[tokio::test]
async fn test_manual_retry_only_from_failed() {
    let h = harness().await;
    let video_id = seed_video(&h.db, "Retry").await;

    h.encoder
        .set_behavior(Resolution::P120, MockBehavior::Corrupt);
    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Failed);

    // Admin retry puts it back in the queue with the same ladder
    h.encoder
        .set_behavior(Resolution::P120, MockBehavior::Succeed);
    let job = h.queue.retry(video_id).await.unwrap();
    assert_eq!(job.resolutions.0, Resolution::LADDER.to_vec());
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Queued);

    assert!(h.worker.process_next().await.unwrap());
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Processed);

    // Processed is terminal for the pipeline: no further retry
    let err = h.queue.retry(video_id).await.unwrap_err();
    assert_matches!(err, PipelineError::InvalidTransition { .. });
}

// ============================================================================
// Crash recovery
// ============================================================================

#[tokio::test]
async fn test_expired_lease_is_reclaimed() {
    let h = harness_with(0, 3, false).await;
    let video_id = seed_video(&h.db, "Crashed").await;

    h.queue.enqueue(video_id, &[]).await.unwrap();

    // Simulate a worker that claims and dies without acking
    let job = h.queue.claim_next("doomed-worker").await.unwrap().unwrap();
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Processing);

    // Zero-length lease: expired as soon as the clock ticks over
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.queue.reclaim_expired().await.unwrap(), 1);
    assert_eq!(video_status(&h.db, video_id).await, VideoStatus::Queued);

    let reclaimed = h.queue.claim_next("healthy-worker").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempts, 2);
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("healthy-worker"));
}

// ============================================================================
// Variant registry
// ============================================================================

#[tokio::test]
async fn test_registry_ready_listing_and_lookup() {
    let h = harness().await;
    let registry = VariantRegistry::new(h.db.clone());
    let video_id = seed_video(&h.db, "Registry").await;

    h.encoder
        .set_behavior(Resolution::P360, MockBehavior::FailResolution);

    h.queue
        .enqueue(video_id, &[Resolution::P1080, Resolution::P120, Resolution::P360])
        .await
        .unwrap();
    assert!(h.worker.process_next().await.unwrap());

    let ready = registry.list_ready(video_id).await.unwrap();
    let labels: Vec<Resolution> = ready.iter().map(|v| v.resolution).collect();
    assert_eq!(labels, vec![Resolution::P120, Resolution::P1080]);

    // Failed and unattempted resolutions both read as unavailable
    assert!(
        registry
            .get(video_id, Resolution::P360)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        registry
            .get(video_id, Resolution::P720)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        registry
            .get(video_id, Resolution::P120)
            .await
            .unwrap()
            .is_some()
    );

    let progress = registry.progress(video_id).await.unwrap();
    assert_eq!(progress.status, VideoStatus::Processed);
    assert_eq!(
        progress.requested,
        vec![Resolution::P120, Resolution::P360, Resolution::P1080]
    );
    assert_eq!(progress.ready, vec![Resolution::P120, Resolution::P1080]);
    assert_eq!(progress.failed, vec![Resolution::P360]);
    assert!((progress.percent_ready() - 66.66).abs() < 1.0);
}

// ============================================================================
// HLS publishing
// ============================================================================

#[tokio::test]
async fn test_hls_master_playlist_tracks_ready_variants() {
    let h = harness_with(600, 3, true).await;
    let video_id = seed_video(&h.db, "Streamable").await;

    h.encoder
        .set_behavior(Resolution::P480, MockBehavior::FailResolution);

    h.queue.enqueue(video_id, &[]).await.unwrap();
    assert!(h.worker.process_next().await.unwrap());

    let master = h.layout.master_playlist_path(video_id);
    let contents = tokio::fs::read_to_string(&master).await.unwrap();

    for res in [
        Resolution::P120,
        Resolution::P360,
        Resolution::P720,
        Resolution::P1080,
    ] {
        assert!(contents.contains(&format!("{}/index.m3u8", res.as_str())));
        assert!(
            h.layout
                .hls_variant_dir(video_id, res)
                .join("index.m3u8")
                .exists()
        );
    }
    assert!(!contents.contains("480p/index.m3u8"));
}

// ============================================================================
// Ingest
// ============================================================================

#[tokio::test]
async fn test_ingest_file_registers_and_enqueues() {
    let h = harness().await;
    let incoming = tempfile::tempdir().unwrap();
    let ingest = IngestService::new(
        h.db.clone(),
        h.queue.clone(),
        h.layout.clone(),
        incoming.path(),
    );

    let upload = incoming.path().join("Summer_Trip.2024.mp4");
    tokio::fs::write(&upload, b"fake video bytes").await.unwrap();

    let video = ingest.ingest_file(&upload).await.unwrap();

    assert_eq!(video.title, "Summer Trip 2024");
    assert_eq!(video.status, VideoStatus::Queued);
    assert!(!upload.exists());

    let source = PathBuf::from(&video.source_path);
    assert_eq!(source, h.layout.source_path(video.id, "mp4"));
    assert!(source.exists());

    let job = h
        .db
        .transcode_jobs()
        .active_for_video(video.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.resolutions.0, Resolution::LADDER.to_vec());
}

#[tokio::test]
async fn test_scan_incoming_skips_non_video_files() {
    let h = harness().await;
    let incoming = tempfile::tempdir().unwrap();
    let ingest = IngestService::new(
        h.db.clone(),
        h.queue.clone(),
        h.layout.clone(),
        incoming.path(),
    );

    tokio::fs::write(incoming.path().join("one.mp4"), b"a")
        .await
        .unwrap();
    tokio::fs::write(incoming.path().join("two.mkv"), b"b")
        .await
        .unwrap();
    tokio::fs::write(incoming.path().join("notes.txt"), b"c")
        .await
        .unwrap();
    tokio::fs::write(incoming.path().join(".hidden.mp4"), b"d")
        .await
        .unwrap();

    assert_eq!(ingest.scan_incoming().await.unwrap(), 2);
    assert!(incoming.path().join("notes.txt").exists());
    assert!(incoming.path().join(".hidden.mp4").exists());

    // Both registered videos are queued with jobs waiting
    assert_eq!(
        h.db.videos()
            .list_by_status(VideoStatus::Queued)
            .await
            .unwrap()
            .len(),
        2
    );
}
