//! Upload ingest adapter
//!
//! The excluded upload endpoint signals "upload completed" by handing us a
//! file. [`IngestService::ingest_file`] is that entry point as an explicit
//! function call: move the source into the library layout, register the
//! video, enqueue the transcode job. `scan_incoming` sweeps a drop
//! directory on a schedule so the pipeline also runs standalone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::db::{CreateVideo, Database, VideoRecord};
use crate::media::layout::MediaLayout;
use crate::services::queue::TranscodeQueue;

/// Check if a file extension is a video type
pub fn is_video_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    matches!(
        ext.to_lowercase().as_str(),
        "mkv" | "mp4" | "avi" | "wmv" | "mov" | "m4v" | "ts" | "webm" | "m2ts" | "ogv" | "flv"
            | "divx"
    )
}

/// Derive a display title from an uploaded filename.
fn title_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let cleaned = sanitize_filename::sanitize(stem);
    let cleaned = cleaned.replace(['_', '.'], " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

/// Rename with copy fallback for cross-filesystem moves.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("copying '{}' to '{}'", from.display(), to.display()))?;
    tokio::fs::remove_file(from)
        .await
        .with_context(|| format!("removing '{}'", from.display()))?;
    Ok(())
}

pub struct IngestService {
    db: Database,
    queue: Arc<TranscodeQueue>,
    layout: MediaLayout,
    incoming: PathBuf,
}

impl IngestService {
    pub fn new(
        db: Database,
        queue: Arc<TranscodeQueue>,
        layout: MediaLayout,
        incoming: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            queue,
            layout,
            incoming: incoming.into(),
        }
    }

    /// Register one uploaded file and enqueue its transcode job.
    ///
    /// The source is moved into `videos/<id>/source.<ext>` before the
    /// video row exists, so a crash mid-ingest leaves no row pointing at
    /// a missing file.
    pub async fn ingest_file(&self, path: &Path) -> Result<VideoRecord> {
        anyhow::ensure!(
            is_video_file(path),
            "not a video file: {}",
            path.display()
        );

        let id = Uuid::new_v4();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_lowercase();
        let title = title_from_filename(path);

        let dest = self.layout.source_path(id, &extension);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        move_file(path, &dest).await?;

        let video = self
            .db
            .videos()
            .create(CreateVideo {
                id,
                title: title.clone(),
                source_path: dest.to_string_lossy().into_owned(),
            })
            .await?;

        // Full ladder for every upload
        self.queue.enqueue(id, &[]).await?;

        info!(
            video_id = %id,
            title = %title,
            source = %dest.display(),
            "Ingested uploaded video"
        );

        Ok(self.db.videos().get(id).await?.unwrap_or(video))
    }

    /// Sweep the incoming drop directory, ingesting every video file
    /// found. Returns the number of videos registered.
    pub async fn scan_incoming(&self) -> Result<usize> {
        if !self.incoming.exists() {
            return Ok(0);
        }

        let files: Vec<PathBuf> = WalkDir::new(&self.incoming)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                let hidden = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                !hidden && is_video_file(p)
            })
            .collect();

        let mut ingested = 0;
        for file in files {
            match self.ingest_file(&file).await {
                Ok(video) => {
                    ingested += 1;
                    info!(video_id = %video.id, path = %file.display(), "Queued for transcoding");
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Failed to ingest file");
                }
            }
        }

        Ok(ingested)
    }
}
