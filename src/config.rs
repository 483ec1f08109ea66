//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub database_path: String,

    /// Media library root path (variants, thumbnails, HLS output)
    pub media_path: String,

    /// Drop directory scanned for uploaded sources
    pub incoming_path: String,

    /// Number of transcode workers
    pub worker_count: usize,

    /// Worker poll interval when the queue is empty (seconds)
    pub poll_interval_secs: u64,

    /// How long a claimed job is leased before it is considered abandoned
    pub lease_secs: u64,

    /// Maximum claim attempts before a job fails permanently
    pub max_attempts: u32,

    /// Incoming scan cadence (seconds)
    pub ingest_scan_secs: u32,

    /// Lease sweep cadence (seconds)
    pub lease_sweep_secs: u32,

    /// Whether to publish HLS renditions alongside the MP4 ladder
    pub hls_enabled: bool,

    /// Path to the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path to the ffprobe executable
    pub ffprobe_path: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/projectionist.db".to_string()),

            media_path: env::var("MEDIA_PATH").unwrap_or_else(|_| "./data/media".to_string()),

            incoming_path: env::var("INCOMING_PATH")
                .unwrap_or_else(|_| "./data/incoming".to_string()),

            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid WORKER_COUNT")?,

            poll_interval_secs: env::var("WORKER_POLL_SECS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid WORKER_POLL_SECS")?,

            lease_secs: env::var("JOB_LEASE_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid JOB_LEASE_SECS")?,

            max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid JOB_MAX_ATTEMPTS")?,

            ingest_scan_secs: env::var("INGEST_SCAN_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid INGEST_SCAN_SECS")?,

            lease_sweep_secs: env::var("LEASE_SWEEP_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid LEASE_SWEEP_SECS")?,

            hls_enabled: env::var("HLS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        })
    }
}
