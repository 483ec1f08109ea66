//! Media tooling: encode profiles, ffmpeg/ffprobe services, file layout

pub mod encoder;
pub mod hls;
pub mod layout;
pub mod probe;
pub mod profiles;

pub use encoder::{FfmpegEncoder, VideoEncoder};
pub use layout::MediaLayout;
pub use probe::{MediaProbe, ProbeResult};
pub use profiles::{EncodeProfile, Resolution, normalize_ladder};
