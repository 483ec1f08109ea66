//! FFprobe-based media inspection
//!
//! Uses ffprobe (command-line) to read container metadata. ffprobe's JSON
//! output format is stable and well-documented, which makes it more
//! reliable than Rust FFmpeg bindings.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// FFprobe JSON output structures
mod ffprobe {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub format_name: Option<String>,
        pub duration: Option<String>,
        pub size: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub duration: Option<String>,
    }
}

/// Container-level facts the pipeline cares about.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub container_format: String,
    pub duration_secs: Option<f64>,
    pub size_bytes: Option<i64>,
}

/// Media probe service using ffprobe
#[derive(Clone)]
pub struct MediaProbe {
    ffprobe_path: String,
}

impl MediaProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Check if ffprobe is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Probe a media file for container metadata.
    pub async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        debug!(path = %path.display(), "Probing media file with ffprobe");

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .with_context(|| format!("Failed to execute ffprobe for '{}'", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "ffprobe failed for '{}': {}",
                path.display(),
                if stderr.is_empty() {
                    "no error output"
                } else {
                    stderr.trim()
                }
            );
        }

        let probe: ffprobe::FfprobeOutput = serde_json::from_slice(&output.stdout)
            .context("Failed to parse ffprobe JSON output")?;

        Ok(convert_probe_output(probe))
    }

    /// Duration of a media file in seconds.
    pub async fn duration_secs(&self, path: &Path) -> Result<f64> {
        let result = self.probe(path).await?;
        result
            .duration_secs
            .with_context(|| format!("No duration reported for '{}'", path.display()))
    }
}

fn convert_probe_output(probe: ffprobe::FfprobeOutput) -> ProbeResult {
    let format = probe.format;
    let container_format = format
        .as_ref()
        .and_then(|f| f.format_name.clone())
        .unwrap_or_default();
    let size_bytes = format
        .as_ref()
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<i64>().ok());

    // Container duration first, first stream duration as fallback
    let duration_secs = format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe.streams.as_ref().and_then(|streams| {
                streams
                    .iter()
                    .find(|s| s.codec_type.as_deref() == Some("video"))
                    .or_else(|| streams.first())
                    .and_then(|s| s.duration.as_ref())
                    .and_then(|d| d.parse::<f64>().ok())
            })
        });

    ProbeResult {
        container_format,
        duration_secs,
        size_bytes,
    }
}
