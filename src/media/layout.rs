//! On-disk layout of the media library
//!
//! The path namespace is partitioned by video id and resolution label so
//! concurrent jobs for different videos never collide on output paths.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::media::profiles::Resolution;

/// Resolves all pipeline output paths under one media root.
#[derive(Debug, Clone)]
pub struct MediaLayout {
    root: PathBuf,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything for one video.
    pub fn video_dir(&self, video_id: Uuid) -> PathBuf {
        self.root.join("videos").join(video_id.to_string())
    }

    /// Where the uploaded source lands, keeping its original extension.
    pub fn source_path(&self, video_id: Uuid, extension: &str) -> PathBuf {
        self.video_dir(video_id).join(format!("source.{extension}"))
    }

    /// Encoded MP4 for one resolution.
    pub fn variant_path(&self, video_id: Uuid, resolution: Resolution) -> PathBuf {
        self.video_dir(video_id)
            .join(format!("{}.mp4", resolution.as_str()))
    }

    pub fn thumbnail_path(&self, video_id: Uuid) -> PathBuf {
        self.video_dir(video_id).join("thumb.png")
    }

    /// HLS directory for one video (renditions + master playlist).
    pub fn hls_dir(&self, video_id: Uuid) -> PathBuf {
        self.root.join("hls").join(video_id.to_string())
    }

    /// HLS rendition directory for one resolution.
    pub fn hls_variant_dir(&self, video_id: Uuid, resolution: Resolution) -> PathBuf {
        self.hls_dir(video_id).join(resolution.as_str())
    }

    pub fn master_playlist_path(&self, video_id: Uuid) -> PathBuf {
        self.hls_dir(video_id).join("master.m3u8")
    }
}
