//! yt-dlp adapter for audio and caption extraction.
//!
//! Shells out to the yt-dlp binary, extracting audio as MP3 alongside
//! whatever caption tracks exist in the preferred languages. Transient
//! network failures are retried by yt-dlp itself (`--retries`); a
//! non-zero exit here is final for the job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::domain::{CaptionSource, DownloadedAsset};

use super::{DownloadError, MediaDownloader};

/// yt-dlp subprocess downloader
pub struct YtDlpDownloader {
    /// Path to the yt-dlp binary (default: "yt-dlp", override with YTDLP_PATH)
    binary_path: String,

    /// Directory for per-job temp files
    temp_dir: PathBuf,

    /// Audio bitrate in kbps
    audio_quality: u32,

    /// Preferred caption languages, in priority order
    caption_langs: Vec<String>,
}

/// Metadata printed by yt-dlp as JSON on stdout
#[derive(Debug, Deserialize)]
struct ExtractorInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    subtitles: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    automatic_captions: serde_json::Map<String, serde_json::Value>,
}

impl YtDlpDownloader {
    pub fn new(temp_dir: PathBuf, audio_quality: u32, caption_langs: Vec<String>) -> Self {
        let binary_path =
            std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

        Self {
            binary_path,
            temp_dir,
            audio_quality,
            caption_langs,
        }
    }

    /// Locate the extracted audio file for a video id
    fn find_audio(&self, video_id: &str) -> Option<PathBuf> {
        let expected = self.temp_dir.join(format!("{}.mp3", video_id));
        if expected.exists() {
            return Some(expected);
        }

        // yt-dlp occasionally appends format ids to the stem
        let pattern = self.temp_dir.join(format!("{}*.mp3", video_id));
        glob::glob(&pattern.to_string_lossy())
            .ok()?
            .filter_map(Result::ok)
            .next()
    }

    /// Locate the best caption file, preferring manual tracks in the
    /// configured language order.
    fn find_caption(
        &self,
        video_id: &str,
        info: &ExtractorInfo,
    ) -> (Option<PathBuf>, Option<CaptionSource>) {
        for lang in &self.caption_langs {
            let path = self.temp_dir.join(format!("{}.{}.vtt", video_id, lang));
            if path.exists() {
                let source = self.caption_provenance(lang, info);
                return (Some(path), Some(source));
            }

            let orig = self.temp_dir.join(format!("{}.{}-orig.vtt", video_id, lang));
            if orig.exists() {
                return (Some(orig), Some(CaptionSource::Auto));
            }
        }

        // Broad search: any caption track beats none
        let pattern = self.temp_dir.join(format!("{}*.vtt", video_id));
        if let Ok(paths) = glob::glob(&pattern.to_string_lossy()) {
            if let Some(path) = paths.filter_map(Result::ok).next() {
                let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
                let source = if name.contains("-orig") {
                    CaptionSource::Auto
                } else {
                    CaptionSource::Manual
                };
                return (Some(path), Some(source));
            }
        }

        (None, None)
    }

    /// Manual and auto tracks download to the same filename; the metadata
    /// says which one the extractor actually had for this language.
    fn caption_provenance(&self, lang: &str, info: &ExtractorInfo) -> CaptionSource {
        if info.subtitles.contains_key(lang) {
            CaptionSource::Manual
        } else if info.automatic_captions.contains_key(lang) {
            CaptionSource::Auto
        } else {
            CaptionSource::Manual
        }
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn fetch(&self, url: &str, video_id: &str) -> Result<DownloadedAsset, DownloadError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let output_template = self
            .temp_dir
            .join(format!("{}.%(ext)s", video_id))
            .to_string_lossy()
            .to_string();

        tracing::info!(%video_id, "Downloading audio and captions");

        let output = Command::new(&self.binary_path)
            .arg(url)
            .args(["-f", "bestaudio/best"])
            .args(["-x", "--audio-format", "mp3"])
            .args(["--audio-quality", &self.audio_quality.to_string()])
            .args(["--write-subs", "--write-auto-subs"])
            .args(["--sub-langs", &self.caption_langs.join(",")])
            .args(["--sub-format", "vtt"])
            .args(["--retries", "3", "--fragment-retries", "3"])
            .args(["--no-warnings", "--print-json"])
            .args(["-o", &output_template])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Extractor(stderr.trim().to_string()));
        }

        let info: ExtractorInfo = serde_json::from_slice(&output.stdout)?;

        let audio_path = self
            .find_audio(video_id)
            .ok_or_else(|| DownloadError::MissingAudio(video_id.to_string()))?;

        let (caption_path, caption_source) = self.find_caption(video_id, &info);

        let asset = DownloadedAsset {
            video_id: video_id.to_string(),
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            channel: info
                .channel
                .or(info.uploader)
                .unwrap_or_else(|| "Unknown".to_string()),
            duration_secs: info.duration.unwrap_or(0.0) as u64,
            upload_date: info.upload_date,
            thumbnail_url: info.thumbnail,
            description: info.description,
            audio_path,
            caption_path,
            caption_source,
        };

        tracing::info!(
            title = %asset.title,
            duration_secs = asset.duration_secs,
            captions = %asset.caption_source.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
            "Download complete"
        );

        Ok(asset)
    }

    async fn cleanup(&self, video_id: &str) {
        let pattern = self.temp_dir.join(format!("{}*", video_id));

        let paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(%video_id, error = %e, "Cleanup glob failed");
                return;
            }
        };

        for path in paths.filter_map(Result::ok) {
            if path.is_file() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Cleanup failed");
                } else {
                    tracing::debug!(path = %path.display(), "Cleaned up");
                }
            }
        }
    }
}
