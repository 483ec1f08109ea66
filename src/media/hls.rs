//! HLS master playlist generation
//!
//! Renditions are segmented by the encoder (stream copy); this module
//! writes the master playlist that points at whichever renditions are
//! ready. The playlist is regenerated whenever the ready set changes, so
//! a client polling mid-processing sees a growing ladder.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::media::profiles::{Resolution, normalize_ladder};

/// Render a master playlist for the given ready resolutions.
///
/// Entries are ordered lowest resolution first and reference the
/// per-resolution rendition playlists relative to the master.
pub fn render_master_playlist(ready: &[Resolution]) -> String {
    let ready = normalize_ladder(ready);

    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for resolution in ready {
        let profile = resolution.profile();
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}/index.m3u8\n",
            profile.bandwidth(),
            profile.width,
            profile.height,
            resolution.as_str(),
        ));
    }
    out
}

/// Write the master playlist into `path`, replacing any previous one.
pub async fn write_master_playlist(path: &Path, ready: &[Resolution]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Write-then-rename so a reader never sees a truncated playlist
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    tokio::fs::write(&tmp, render_master_playlist(ready)).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(path.to_path_buf())
}
