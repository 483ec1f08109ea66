//! Resolution ladder and encode profiles
//!
//! The ladder is a fixed ordered set: variants are encoded lowest first so
//! a low-quality stream becomes playable before the expensive renditions
//! finish.

use serde::{Deserialize, Serialize};

/// Output resolution label. Ordering follows the ladder (lowest first).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
pub enum Resolution {
    #[serde(rename = "120p")]
    #[sqlx(rename = "120p")]
    P120,
    #[serde(rename = "360p")]
    #[sqlx(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    #[sqlx(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    #[sqlx(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    #[sqlx(rename = "1080p")]
    P1080,
}

impl Resolution {
    /// The full ladder in encode order.
    pub const LADDER: [Resolution; 5] = [
        Resolution::P120,
        Resolution::P360,
        Resolution::P480,
        Resolution::P720,
        Resolution::P1080,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P120 => "120p",
            Resolution::P360 => "360p",
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        }
    }

    /// Parse a label like "720p". Unknown labels return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "120p" => Some(Resolution::P120),
            "360p" => Some(Resolution::P360),
            "480p" => Some(Resolution::P480),
            "720p" => Some(Resolution::P720),
            "1080p" => Some(Resolution::P1080),
            _ => None,
        }
    }

    pub fn profile(&self) -> EncodeProfile {
        match self {
            Resolution::P120 => EncodeProfile::new(*self, 160, 120, "96k"),
            Resolution::P360 => EncodeProfile::new(*self, 640, 360, "800k"),
            Resolution::P480 => EncodeProfile::new(*self, 854, 480, "1000k"),
            Resolution::P720 => EncodeProfile::new(*self, 1280, 720, "2500k"),
            Resolution::P1080 => EncodeProfile::new(*self, 1920, 1080, "5000k"),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoder settings for one output resolution.
///
/// H.264 video at the profile bitrate, AAC audio at 128k, MP4 container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    pub resolution: Resolution,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
}

impl EncodeProfile {
    fn new(resolution: Resolution, width: u32, height: u32, video_bitrate: &'static str) -> Self {
        Self {
            resolution,
            width,
            height,
            video_bitrate,
            audio_bitrate: "128k",
        }
    }

    /// Scale filter argument for ffmpeg, e.g. "scale=1280:720".
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }

    /// Approximate total bandwidth in bits per second (video + audio),
    /// used for HLS master playlist annotations.
    pub fn bandwidth(&self) -> u64 {
        let parse = |s: &str| -> u64 {
            s.trim_end_matches('k').parse::<u64>().unwrap_or(0) * 1000
        };
        parse(self.video_bitrate) + parse(self.audio_bitrate)
    }
}

/// Normalize a requested resolution set: sort ascending and drop duplicates.
pub fn normalize_ladder(requested: &[Resolution]) -> Vec<Resolution> {
    let mut out: Vec<Resolution> = requested.to_vec();
    out.sort();
    out.dedup();
    out
}
