//! FFmpeg-based encoding service
//!
//! The worker only talks to the [`VideoEncoder`] trait; the ffmpeg
//! implementation shells out to the command-line tools. Outputs are
//! written to a temp path and renamed into place so a partially written
//! file is never visible under its final name.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::EncodeError;
use crate::media::probe::MediaProbe;
use crate::media::profiles::EncodeProfile;

/// Encoder operations the transcode worker depends on.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode `source` into `dest` with the given resolution profile.
    async fn encode(
        &self,
        source: &Path,
        dest: &Path,
        profile: &EncodeProfile,
    ) -> Result<(), EncodeError>;

    /// Duration of the media at `source` in seconds.
    async fn probe_duration(&self, source: &Path) -> Result<f64, EncodeError>;

    /// Extract a single-frame PNG thumbnail into `dest`.
    async fn extract_thumbnail(&self, source: &Path, dest: &Path) -> Result<(), EncodeError>;

    /// Package an encoded variant as an HLS rendition under `dest_dir`;
    /// returns the playlist path.
    async fn package_hls(&self, variant: &Path, dest_dir: &Path) -> Result<PathBuf, EncodeError>;
}

/// Production encoder shelling out to ffmpeg/ffprobe.
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    probe: MediaProbe,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            probe: MediaProbe::new(ffprobe_path),
        }
    }

    /// Check if ffmpeg is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run_ffmpeg(&self, args: &[&str], descriptor: &str) -> Result<(), EncodeError> {
        debug!(descriptor, ?args, "Running ffmpeg");

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            // A spawn failure means the encoder binary itself is missing
            // or unrunnable, not that the input is bad.
            .map_err(|e| EncodeError::transient(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim(), descriptor));
        }

        Ok(())
    }

    /// Run ffmpeg writing to a temp path, then rename into `dest`.
    async fn run_to_file(
        &self,
        pre_output_args: Vec<String>,
        dest: &Path,
        descriptor: &str,
    ) -> Result<(), EncodeError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EncodeError::transient(format!("creating output dir: {e}")))?;
        }

        let tmp = PathBuf::from(format!("{}.tmp", dest.display()));
        let mut args: Vec<&str> = pre_output_args.iter().map(String::as_str).collect();
        let tmp_str = tmp.to_string_lossy().into_owned();
        args.push(&tmp_str);

        let result = self.run_ffmpeg(&args, descriptor).await;

        match result {
            Ok(()) => tokio::fs::rename(&tmp, dest)
                .await
                .map_err(|e| EncodeError::transient(format!("renaming output: {e}"))),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        source: &Path,
        dest: &Path,
        profile: &EncodeProfile,
    ) -> Result<(), EncodeError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vf".to_string(),
            profile.scale_filter(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-b:v".to_string(),
            profile.video_bitrate.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            profile.audio_bitrate.to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ];

        self.run_to_file(args, dest, profile.resolution.as_str())
            .await
    }

    async fn probe_duration(&self, source: &Path) -> Result<f64, EncodeError> {
        self.probe
            .duration_secs(source)
            .await
            .map_err(|e| EncodeError::resolution_failed(e.to_string()))
    }

    async fn extract_thumbnail(&self, source: &Path, dest: &Path) -> Result<(), EncodeError> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            "1".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vframes".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2".to_string(),
            "-c:v".to_string(),
            "png".to_string(),
        ];

        self.run_to_file(args, dest, "thumbnail").await
    }

    async fn package_hls(&self, variant: &Path, dest_dir: &Path) -> Result<PathBuf, EncodeError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| EncodeError::transient(format!("creating hls dir: {e}")))?;

        let playlist = dest_dir.join("index.m3u8");
        let variant_str = variant.to_string_lossy().into_owned();
        let playlist_str = playlist.to_string_lossy().into_owned();
        let args = [
            "-y",
            "-i",
            &variant_str,
            "-codec",
            "copy",
            "-start_number",
            "0",
            "-hls_time",
            "10",
            "-hls_list_size",
            "0",
            "-f",
            "hls",
            &playlist_str,
        ];

        self.run_ffmpeg(&args, "hls").await?;

        Ok(playlist)
    }
}

/// Map a non-zero ffmpeg exit onto an error kind by inspecting stderr.
fn classify_failure(stderr: &str, descriptor: &str) -> EncodeError {
    const CORRUPT_MARKERS: &[&str] = &[
        "Invalid data found when processing input",
        "moov atom not found",
        "could not find codec parameters",
        "Header missing",
    ];
    const TRANSIENT_MARKERS: &[&str] = &[
        "No space left on device",
        "Cannot allocate memory",
        "Resource temporarily unavailable",
        "Input/output error",
    ];

    let message = if stderr.is_empty() {
        format!("{descriptor} failed with no error output")
    } else {
        // Last lines carry the actual failure; the head is banner noise
        let tail: Vec<&str> = stderr.lines().rev().take(4).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        format!("{descriptor} failed: {}", tail.join(" | "))
    };

    if CORRUPT_MARKERS.iter().any(|m| stderr.contains(m)) {
        EncodeError::source_corrupt(message)
    } else if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        EncodeError::transient(message)
    } else {
        EncodeError::resolution_failed(message)
    }
}
