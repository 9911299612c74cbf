//! Video reference and downloaded-asset types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A resolved reference to a single video.
///
/// Derived deterministically from job content; immutable once resolved.
/// The canonical URL is always the watch-page form, regardless of which
/// URL flavor the job file contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoReference {
    /// 11-character video identifier
    pub video_id: String,

    /// Canonical watch URL (https://www.youtube.com/watch?v=...)
    pub url: String,
}

impl VideoReference {
    /// Build a reference from a validated video id
    pub fn from_id(video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        Self { video_id, url }
    }
}

/// Provenance of a provider-supplied caption track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSource {
    /// Human-authored captions
    Manual,

    /// Machine-generated captions
    Auto,
}

impl std::fmt::Display for CaptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptionSource::Manual => write!(f, "manual"),
            CaptionSource::Auto => write!(f, "auto"),
        }
    }
}

/// Result of a media download, owned by the orchestrator for the lifetime
/// of one job. Temp files are deleted on completion or failure.
#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub video_id: String,
    pub title: String,
    pub channel: String,

    /// Duration in seconds
    pub duration_secs: u64,

    /// Upload date in YYYYMMDD form, if the extractor reported one
    pub upload_date: Option<String>,

    pub thumbnail_url: Option<String>,
    pub description: Option<String>,

    /// Path to the extracted audio file (MP3)
    pub audio_path: PathBuf,

    /// Caption track, if one was available
    pub caption_path: Option<PathBuf>,
    pub caption_source: Option<CaptionSource>,
}

/// Format a duration in seconds as a short human-readable string
/// ("1h 3m", "4m 12s", "45s")
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "Unknown".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
